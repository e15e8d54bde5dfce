use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::core::hash::{sha256_file, short_hash};
use crate::core::manifest::{ChunkDescriptor, Manifest};
use crate::core::signer::{verify_signature, SigningKey};
use crate::core::snapshot::{resolve_site, MANIFEST_FILE, SIGNATURE_FILE};
use crate::error::{ErrorContext, SnapError};

/// How many chunks to check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    Count(usize),
    All,
}

/// One sampled chunk that did not check out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFailure {
    Missing {
        id: String,
        artifact_path: String,
    },
    Mismatch {
        id: String,
        artifact_path: String,
        expected: String,
        actual: String,
    },
    Unreadable {
        id: String,
        artifact_path: String,
        reason: String,
    },
    InvalidPath {
        id: String,
        artifact_path: String,
    },
}

impl ChunkFailure {
    pub fn id(&self) -> &str {
        match self {
            ChunkFailure::Missing { id, .. }
            | ChunkFailure::Mismatch { id, .. }
            | ChunkFailure::Unreadable { id, .. }
            | ChunkFailure::InvalidPath { id, .. } => id,
        }
    }
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkFailure::Missing { id, artifact_path } => {
                write!(f, "{}: artifact {} is missing", id, artifact_path)
            }
            ChunkFailure::Mismatch { id, artifact_path, expected, actual } => {
                write!(
                    f,
                    "{}: artifact {} hash mismatch (expected {}, got {})",
                    id,
                    artifact_path,
                    short_hash(expected),
                    short_hash(actual)
                )
            }
            ChunkFailure::Unreadable { id, artifact_path, reason } => {
                write!(f, "{}: artifact {} unreadable: {}", id, artifact_path, reason)
            }
            ChunkFailure::InvalidPath { id, artifact_path } => {
                write!(f, "{}: artifact path {} escapes the snapshot", id, artifact_path)
            }
        }
    }
}

/// Result of sampling chunk artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub site: PathBuf,
    pub total_chunks: usize,
    pub sampled: usize,
    pub failures: Vec<ChunkFailure>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Why a snapshot could not be verified at all
#[derive(Debug)]
pub enum VerifyError {
    /// `manifest.json` or `manifest.sig` is absent
    MissingArtifact(PathBuf),
    /// The stored signature does not match the manifest bytes
    SignatureMismatch,
    /// Signed correctly but not a valid manifest
    MalformedManifest(SnapError),
    Other(SnapError),
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyError::MissingArtifact(path) => write!(f, "snapshot is incomplete: {} not found", path.display()),
            VerifyError::SignatureMismatch => write!(f, "manifest signature mismatch"),
            VerifyError::MalformedManifest(err) => write!(f, "manifest is malformed: {}", err),
            VerifyError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for VerifyError {}

impl From<SnapError> for VerifyError {
    fn from(err: SnapError) -> Self {
        VerifyError::Other(err)
    }
}

/// Checks the manifest signature in full and a random sample of chunk artifacts.
///
/// With `n` of `N` chunks sampled, a single corrupted chunk is found with
/// probability `n / N`. All sampled chunks are checked before reporting.
pub struct Verifier<'a> {
    key: &'a SigningKey,
    seed: Option<u64>,
}

impl<'a> Verifier<'a> {
    pub fn new(key: &'a SigningKey) -> Self {
        Self { key, seed: None }
    }

    /// Fix the sampling order, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check the signature, then a sample of chunk artifacts.
    pub fn verify(&self, site: &Path, samples: SampleSize) -> Result<VerifyReport, VerifyError> {
        let site = resolve_site(site)?;
        let manifest = self.load_signed_manifest(&site)?;

        let chunks: Vec<&ChunkDescriptor> = manifest.chunks().collect();
        let picked = self.pick(chunks.len(), samples);
        debug!(site = %site.display(), total = chunks.len(), sampled = picked.len(), "sampling chunks");

        let mut failures = Vec::new();
        for i in &picked {
            if let Some(failure) = check_chunk(&site, chunks[*i]) {
                warn!(chunk = failure.id(), "{}", failure);
                failures.push(failure);
            }
        }

        Ok(VerifyReport {
            site,
            total_chunks: chunks.len(),
            sampled: picked.len(),
            failures,
        })
    }

    /// Read the manifest, check its signature over the exact on-disk bytes, then parse it.
    pub fn load_signed_manifest(&self, site: &Path) -> Result<Manifest, VerifyError> {
        let manifest_path = site.join(MANIFEST_FILE);
        let signature_path = site.join(SIGNATURE_FILE);
        for path in [&manifest_path, &signature_path] {
            if !path.is_file() {
                return Err(VerifyError::MissingArtifact(path.clone()));
            }
        }

        let manifest_bytes = fs::read(&manifest_path)
            .with_io_context(|| format!("reading {}", manifest_path.display()))?;
        let signature = fs::read_to_string(&signature_path)
            .with_io_context(|| format!("reading {}", signature_path.display()))?;

        if !verify_signature(&manifest_bytes, self.key, &signature) {
            warn!(site = %site.display(), "manifest signature mismatch");
            return Err(VerifyError::SignatureMismatch);
        }

        Manifest::from_bytes(&manifest_bytes).map_err(VerifyError::MalformedManifest)
    }

    /// Indices of the chunks to check, without repeats
    fn pick(&self, total: usize, samples: SampleSize) -> Vec<usize> {
        let amount = match samples {
            SampleSize::All => total,
            SampleSize::Count(n) => n.min(total),
        };
        if amount == total {
            return (0..total).collect();
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut picked = index::sample(&mut rng, total, amount).into_vec();
        picked.sort_unstable();
        picked
    }
}

fn check_chunk(site: &Path, chunk: &ChunkDescriptor) -> Option<ChunkFailure> {
    let Some(path) = artifact_location(site, &chunk.artifact_path) else {
        return Some(ChunkFailure::InvalidPath {
            id: chunk.id.clone(),
            artifact_path: chunk.artifact_path.clone(),
        });
    };

    if !path.is_file() {
        return Some(ChunkFailure::Missing {
            id: chunk.id.clone(),
            artifact_path: chunk.artifact_path.clone(),
        });
    }

    match sha256_file(&path) {
        Ok(actual) if actual.eq_ignore_ascii_case(&chunk.sha256) => None,
        Ok(actual) => Some(ChunkFailure::Mismatch {
            id: chunk.id.clone(),
            artifact_path: chunk.artifact_path.clone(),
            expected: chunk.sha256.clone(),
            actual,
        }),
        Err(err) => Some(ChunkFailure::Unreadable {
            id: chunk.id.clone(),
            artifact_path: chunk.artifact_path.clone(),
            reason: err.to_string(),
        }),
    }
}

/// Join a manifest-supplied relative path onto the site, refusing anything
/// absolute or containing `..`
fn artifact_location(site: &Path, artifact_path: &str) -> Option<PathBuf> {
    let rel = Path::new(artifact_path);
    let safe = !artifact_path.is_empty()
        && rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    safe.then(|| site.join(rel))
}
