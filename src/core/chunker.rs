use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::hash::compute_content_hash;
use crate::core::manifest::{ChunkDescriptor, Encoding};
use crate::error::{Result, SnapError, ErrorContext};

/// First line of every base64 fallback artifact
pub const BASE64_MARKER: &str = "#snapseal:base64\n";

/// Directory inside a snapshot that holds chunk artifacts
pub const CHUNKS_DIR: &str = "chunks";

/// Artifact body for one window of raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub body: Vec<u8>,
    pub encoding: Encoding,
    pub line_count: usize,
}

/// Result of chunking one file
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub size: u64,
    pub sha256: String,
    pub chunks: Vec<ChunkDescriptor>,
}

/// Splits files into fixed-size windows at pure byte offsets.
///
/// A window that decodes as strict UTF-8 is stored verbatim, anything else as a
/// marker line plus base64. An insertion near the start of a file shifts every
/// later chunk.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_bytes: usize,
}

impl Chunker {
    pub fn new(chunk_bytes: usize) -> Result<Self> {
        if chunk_bytes == 0 {
            return Err(SnapError::Validation {
                field: "chunk size".to_string(),
                value: chunk_bytes.to_string(),
                reason: "must be a positive number of bytes".to_string(),
            });
        }
        Ok(Self { chunk_bytes })
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Split `source` into artifacts under `<snapshot_dir>/chunks/`.
    ///
    /// The whole-file digest is computed in the same pass, so it always
    /// describes exactly the bytes that were chunked. On failure, artifacts
    /// already written for this file are removed. Source read failures come
    /// back as [`SnapError::Io`], artifact write failures as
    /// [`SnapError::Snapshot`].
    pub fn chunk_file(
        &self,
        source: &Path,
        rel_path: &str,
        artifact_stem: &str,
        snapshot_dir: &Path,
    ) -> Result<ChunkedFile> {
        let mut written: Vec<PathBuf> = Vec::new();
        let result = self.write_chunks(source, rel_path, artifact_stem, snapshot_dir, &mut written);

        if result.is_err() {
            for path in &written {
                let _ = fs::remove_file(path);
            }
        }
        result
    }

    fn write_chunks(
        &self,
        source: &Path,
        rel_path: &str,
        artifact_stem: &str,
        snapshot_dir: &Path,
        written: &mut Vec<PathBuf>,
    ) -> Result<ChunkedFile> {
        let mut file = File::open(source)
            .with_io_context(|| format!("opening {}", source.display()))?;

        let chunks_dir = snapshot_dir.join(CHUNKS_DIR);
        fs::create_dir_all(&chunks_dir).map_err(|e| artifact_error(&chunks_dir, e))?;

        let mut file_hasher = Sha256::new();
        let mut chunks = Vec::new();
        let mut size: u64 = 0;
        let mut window = Vec::with_capacity(self.chunk_bytes);

        loop {
            window.clear();
            (&mut file)
                .take(self.chunk_bytes as u64)
                .read_to_end(&mut window)
                .with_io_context(|| format!("reading {}", source.display()))?;

            // a zero-byte file still gets one (empty) chunk
            if window.is_empty() && !chunks.is_empty() {
                break;
            }

            file_hasher.update(&window);
            size += window.len() as u64;

            let sequence = chunks.len() + 1;
            let encoded = encode_window(&window);
            let artifact_name = format!("{}.{}.txt", artifact_stem, sequence);
            let artifact_path = chunks_dir.join(&artifact_name);

            fs::write(&artifact_path, &encoded.body)
                .map_err(|e| artifact_error(&artifact_path, e))?;
            written.push(artifact_path);

            chunks.push(ChunkDescriptor {
                id: format!("{}.{}", rel_path, sequence),
                artifact_path: format!("{}/{}", CHUNKS_DIR, artifact_name),
                sha256: compute_content_hash(&encoded.body),
                byte_length: window.len() as u64,
                encoding: encoded.encoding,
                line_count: encoded.line_count,
            });

            if window.len() < self.chunk_bytes {
                break;
            }
        }

        debug!(path = rel_path, chunks = chunks.len(), bytes = size, "chunked file");

        Ok(ChunkedFile {
            size,
            sha256: format!("{:x}", file_hasher.finalize()),
            chunks,
        })
    }
}

/// Failures on the output side are not the source file's fault and abort the build
fn artifact_error(path: &Path, err: std::io::Error) -> SnapError {
    SnapError::Snapshot {
        id: None,
        operation: "writing chunk artifact".to_string(),
        reason: format!("{}: {}", path.display(), err),
    }
}

/// Encode one raw window as an artifact body
pub fn encode_window(window: &[u8]) -> EncodedChunk {
    match std::str::from_utf8(window) {
        Ok(text) => EncodedChunk {
            body: window.to_vec(),
            encoding: Encoding::Text,
            line_count: if text.is_empty() {
                0
            } else {
                text.matches('\n').count() + 1
            },
        },
        Err(_) => {
            let mut body = BASE64_MARKER.as_bytes().to_vec();
            body.extend_from_slice(BASE64.encode(window).as_bytes());
            EncodedChunk {
                body,
                encoding: Encoding::Base64,
                line_count: 0,
            }
        }
    }
}

/// Reverse an artifact's encoding back to the raw slice bytes
pub fn decode_artifact(body: &[u8], encoding: Encoding) -> Result<Vec<u8>> {
    match encoding {
        Encoding::Text => Ok(body.to_vec()),
        Encoding::Base64 => {
            let payload = body
                .strip_prefix(BASE64_MARKER.as_bytes())
                .ok_or_else(|| SnapError::Validation {
                    field: "chunk artifact".to_string(),
                    value: String::from_utf8_lossy(&body[..body.len().min(32)]).into_owned(),
                    reason: "missing base64 marker line".to_string(),
                })?;
            let payload = String::from_utf8_lossy(payload);
            BASE64
                .decode(payload.trim())
                .map_err(|e| SnapError::Validation {
                    field: "chunk artifact".to_string(),
                    value: "base64 payload".to_string(),
                    reason: e.to_string(),
                })
        }
    }
}

/// Turn a root-relative path into a single artifact file name
pub fn flatten_path(rel_path: &str) -> String {
    rel_path.replace('/', "__")
}

/// Hands out artifact stems, keeping them distinct when two paths flatten alike
#[derive(Debug, Default)]
pub struct ArtifactNamer {
    used: HashSet<String>,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem_for(&mut self, rel_path: &str) -> String {
        let flat = flatten_path(rel_path);
        if self.used.insert(flat.clone()) {
            return flat;
        }
        let disambiguated = format!("{}~{}", flat, &compute_content_hash(rel_path.as_bytes())[..8]);
        self.used.insert(disambiguated.clone());
        disambiguated
    }
}
