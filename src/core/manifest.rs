use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::hash::validate_hash_format;
use crate::error::{Result, SnapError, ErrorContext};

/// Default number of entries kept in `feed.json`
pub const DEFAULT_FEED_LIMIT: usize = 200;

/// How a chunk artifact stores its slice of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Text,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    /// `<file_path>.<sequence>`, 1-based
    pub id: String,
    /// Snapshot-relative, forward slashes
    pub artifact_path: String,
    /// Digest of the persisted artifact, not of the raw slice
    pub sha256: String,
    /// Length of the raw slice
    pub byte_length: u64,
    pub encoding: Encoding,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub sha256: String,
    pub chunks: Vec<ChunkDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub built_at: DateTime<Utc>,
    pub root: String,
    pub chunk_bytes: usize,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub mtime: DateTime<Utc>,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub files: usize,
    pub chunks: usize,
    pub bytes: u64,
    pub built_at: DateTime<Utc>,
}

/// A source file left out of the snapshot because it could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

impl Manifest {
    /// Serialize exactly as written to `manifest.json`; the signature covers these bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .with_context(|| "manifest".to_string())
    }

    /// Parse manifest bytes and reject entries whose digests are malformed
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .with_context(|| "manifest".to_string())?;

        for file in &manifest.files {
            if !validate_hash_format(&file.sha256) {
                return Err(SnapError::Validation {
                    field: "file digest".to_string(),
                    value: file.path.clone(),
                    reason: "not a 64 character hex string".to_string(),
                });
            }
            if file.chunks.is_empty() {
                return Err(SnapError::Validation {
                    field: "file entry".to_string(),
                    value: file.path.clone(),
                    reason: "has no chunks".to_string(),
                });
            }
            for chunk in &file.chunks {
                if !validate_hash_format(&chunk.sha256) {
                    return Err(SnapError::Validation {
                        field: "chunk digest".to_string(),
                        value: chunk.id.clone(),
                        reason: "not a 64 character hex string".to_string(),
                    });
                }
            }
        }

        Ok(manifest)
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks.len()).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// All chunk descriptors across files, in manifest order
    pub fn chunks(&self) -> impl Iterator<Item = &ChunkDescriptor> {
        self.files.iter().flat_map(|f| f.chunks.iter())
    }

    pub fn feed(&self, limit: usize) -> Vec<FeedEntry> {
        derive_feed(&self.files, limit)
    }

    pub fn status(&self) -> Status {
        Status::from_manifest(self)
    }
}

impl Status {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            files: manifest.files.len(),
            chunks: manifest.total_chunks(),
            bytes: manifest.total_bytes(),
            built_at: manifest.built_at,
        }
    }
}

/// Most recently modified files first, ties broken by path, capped at `limit`.
pub fn derive_feed(files: &[FileEntry], limit: usize) -> Vec<FeedEntry> {
    let mut feed: Vec<FeedEntry> = files
        .iter()
        .map(|f| FeedEntry {
            mtime: f.mtime,
            path: f.path.clone(),
            sha256: f.sha256.clone(),
        })
        .collect();

    feed.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.path.cmp(&b.path)));
    feed.truncate(limit);
    feed
}

/// Collects file entries in discovery order and the files that had to be skipped.
pub struct ManifestBuilder {
    root: String,
    chunk_bytes: usize,
    files: Vec<FileEntry>,
    skipped: Vec<SkippedFile>,
}

impl ManifestBuilder {
    pub fn new(root: impl Into<String>, chunk_bytes: usize) -> Self {
        Self {
            root: root.into(),
            chunk_bytes,
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Record a file that could not be read; the build carries on without it.
    pub fn skip_file(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        let skipped = SkippedFile {
            path: path.into(),
            reason: reason.into(),
        };
        warn!(path = %skipped.path, reason = %skipped.reason, "skipping unreadable file");
        self.skipped.push(skipped);
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn finish(self, built_at: DateTime<Utc>) -> (Manifest, Vec<SkippedFile>) {
        let manifest = Manifest {
            built_at,
            root: self.root,
            chunk_bytes: self.chunk_bytes,
            files: self.files,
        };
        (manifest, self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn digest(seed: char) -> String {
        std::iter::repeat(seed).take(64).collect()
    }

    fn entry(path: &str, secs: i64, chunks: usize) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            size: (chunks as u64) * 10,
            mtime: Utc.timestamp_opt(secs, 0).unwrap(),
            sha256: digest('a'),
            chunks: (1..=chunks)
                .map(|n| ChunkDescriptor {
                    id: format!("{}.{}", path, n),
                    artifact_path: format!("chunks/{}.{}.txt", path, n),
                    sha256: digest('b'),
                    byte_length: 10,
                    encoding: Encoding::Text,
                    line_count: 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_feed_is_most_recent_first() {
        let files = vec![entry("t1.txt", 100, 1), entry("t3.txt", 300, 1), entry("t2.txt", 200, 1)];
        let feed = derive_feed(&files, DEFAULT_FEED_LIMIT);
        let paths: Vec<&str> = feed.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["t3.txt", "t2.txt", "t1.txt"]);
    }

    #[test]
    fn test_feed_ties_break_by_path_and_truncate() {
        let files = vec![
            entry("zeta.txt", 500, 1),
            entry("alpha.txt", 500, 1),
            entry("old.txt", 1, 1),
        ];
        let feed = derive_feed(&files, 2);
        let paths: Vec<&str> = feed.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha.txt", "zeta.txt"]);
    }

    #[test]
    fn test_builder_counts_and_status() {
        let mut builder = ManifestBuilder::new("/src", 128);
        builder.add_file(entry("a.txt", 10, 1));
        builder.add_file(entry("b.bin", 20, 2));
        builder.skip_file("gone.txt", "No such file or directory");

        assert_eq!(builder.file_count(), 2);
        assert_eq!(builder.skipped_count(), 1);

        let built_at = Utc.timestamp_opt(1_000, 0).unwrap();
        let (manifest, skipped) = builder.finish(built_at);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].path, "gone.txt");

        // discovery order is kept
        assert_eq!(manifest.files[0].path, "a.txt");
        let status = manifest.status();
        assert_eq!(status.files, 2);
        assert_eq!(status.chunks, 3);
        assert_eq!(status.bytes, 30);
        assert_eq!(status.built_at, built_at);
    }

    #[test]
    fn test_manifest_json_shape() {
        let mut builder = ManifestBuilder::new("/src", 128);
        builder.add_file(entry("a.txt", 10, 1));
        let (manifest, _) = builder.finish(Utc.timestamp_opt(0, 0).unwrap());

        let bytes = manifest.to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["chunk_bytes"], 128);
        assert_eq!(value["root"], "/src");
        assert_eq!(value["files"][0]["chunks"][0]["encoding"], "text");
        assert_eq!(value["files"][0]["chunks"][0]["id"], "a.txt.1");

        assert_eq!(Manifest::from_bytes(&bytes).unwrap(), manifest);
    }

    #[test]
    fn test_malformed_manifest_is_rejected() {
        let mut bad = entry("a.txt", 10, 1);
        bad.chunks[0].sha256 = "xyz".to_string();
        let manifest = Manifest {
            built_at: Utc.timestamp_opt(0, 0).unwrap(),
            root: "/src".to_string(),
            chunk_bytes: 16,
            files: vec![bad],
        };
        let bytes = serde_json::to_vec(&manifest).unwrap();
        assert!(Manifest::from_bytes(&bytes).is_err());
        assert!(Manifest::from_bytes(b"{not json").is_err());
    }
}
