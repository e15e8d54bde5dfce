use std::path::Path;

use crate::cli::commands::KeyArgs;
use crate::cli::handlers::resolve_key;
use crate::cli::ui::{print_error_message, print_verify_report};
use crate::config::SnapConfig;
use crate::core::verify::{SampleSize, Verifier, VerifyError};
use crate::error::{Result, SnapError};

pub const EXIT_OK: u8 = 0;
pub const EXIT_SIGNATURE_MISMATCH: u8 = 2;
pub const EXIT_CHUNK_FAILURES: u8 = 3;
pub const EXIT_MISSING_SNAPSHOT: u8 = 4;
pub const EXIT_MALFORMED_MANIFEST: u8 = 5;

/// Options for `snapseal verify`
#[derive(Debug, Clone)]
pub struct VerifyOptions<'a> {
    pub site: &'a Path,
    pub samples: Option<usize>,
    pub seed: Option<u64>,
    pub all: bool,
}

/// Handle `snapseal verify`, returning the process exit code.
///
/// Errors are only returned for problems unrelated to the snapshot itself,
/// such as a missing key.
pub fn handle_verify(options: &VerifyOptions<'_>, key_args: &KeyArgs, config: &SnapConfig) -> Result<u8> {
    let key = resolve_key(key_args, config)?;

    let samples = if options.all {
        SampleSize::All
    } else {
        SampleSize::Count(options.samples.unwrap_or(config.verify.samples))
    };

    let mut verifier = Verifier::new(&key);
    if let Some(seed) = options.seed {
        verifier = verifier.with_seed(seed);
    }

    match verifier.verify(options.site, samples) {
        Ok(report) => {
            print_verify_report(&report);
            Ok(if report.passed() { EXIT_OK } else { EXIT_CHUNK_FAILURES })
        }
        Err(VerifyError::SignatureMismatch) => {
            print_error_message("Manifest signature mismatch: the manifest was modified or the key is wrong");
            Ok(EXIT_SIGNATURE_MISMATCH)
        }
        Err(err @ VerifyError::MissingArtifact(_)) => {
            print_error_message(&err.to_string());
            Ok(EXIT_MISSING_SNAPSHOT)
        }
        Err(VerifyError::Other(err @ SnapError::NotFound { .. })) => {
            print_error_message(&format!("No snapshot found: {}", err));
            Ok(EXIT_MISSING_SNAPSHOT)
        }
        Err(err @ VerifyError::MalformedManifest(_)) => {
            print_error_message(&err.to_string());
            Ok(EXIT_MALFORMED_MANIFEST)
        }
        Err(VerifyError::Other(err)) => Err(err),
    }
}
