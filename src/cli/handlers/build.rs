use indicatif::ProgressBar;

use crate::cli::commands::BuildArgs;
use crate::cli::handlers::resolve_key;
use crate::cli::ui::{create_progress_bar, print_build_summary};
use crate::config::{BuildConfig, SnapConfig};
use crate::core::builder::{BuildOutcome, SnapshotBuilder};
use crate::core::signer::SigningKey;
use crate::error::{Result, SnapError};

/// Merge command-line flags over the `[build]` section of the config file
pub fn resolve_build_config(args: &BuildArgs, config: &SnapConfig) -> Result<BuildConfig> {
    let mut settings = config.build.clone();

    if let Some(root) = &args.root {
        settings.root = Some(root.clone());
    }
    if let Some(out) = &args.out {
        settings.out = Some(out.clone());
    }
    if let Some(kb) = args.chunk_size_kb {
        settings.chunk_bytes = kb.checked_mul(1024).ok_or_else(|| SnapError::Validation {
            field: "chunk size".to_string(),
            value: format!("{} KiB", kb),
            reason: "too large".to_string(),
        })?;
    }
    if let Some(bytes) = args.chunk_bytes {
        settings.chunk_bytes = bytes;
    }
    if !args.include.is_empty() {
        settings.include = args.include.clone();
    }
    settings.exclude.extend(args.exclude.iter().cloned());
    if let Some(limit) = args.feed_limit {
        settings.feed_limit = limit;
    }
    if let Some(keep) = args.keep {
        settings.keep_snapshots = keep;
    }

    BuildConfig::from_settings(&settings)
}

/// Run one build with an optional spinner
pub fn run_build(build: &BuildConfig, key: &SigningKey, show_progress: bool) -> Result<BuildOutcome> {
    let pb = if show_progress {
        create_progress_bar("Selecting files")
    } else {
        ProgressBar::hidden()
    };
    let result = SnapshotBuilder::new(build, key).with_progress(&pb).build();
    pb.finish_and_clear();
    result
}

/// Handle `snapseal build`
pub fn handle_build(args: &BuildArgs, config: &SnapConfig) -> Result<()> {
    let build = resolve_build_config(args, config)?;
    build.validate()?;
    let key = resolve_key(&args.key, config)?;

    let outcome = run_build(&build, &key, config.ui.progress_bars)?;
    print_build_summary(&outcome);
    Ok(())
}
