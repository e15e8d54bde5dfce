use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::core::chunker::{ArtifactNamer, Chunker};
use crate::core::manifest::{FileEntry, Manifest, ManifestBuilder, SkippedFile, Status};
use crate::core::select::{relative_slash_path, PathSelector};
use crate::core::signer::{sign_manifest, SigningKey};
use crate::core::snapshot::{
    write_artifact, write_json_artifact, SnapshotStore, FEED_FILE, MANIFEST_FILE, SIGNATURE_FILE,
    STATUS_FILE,
};
use crate::error::{Result, SnapError, ErrorContext};

/// What a completed build produced
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub snapshot_id: String,
    pub snapshot_dir: PathBuf,
    pub status: Status,
    /// Files that could not be read and are missing from the snapshot
    pub skipped: Vec<SkippedFile>,
    /// Non-fatal problems met while walking the tree
    pub warnings: Vec<String>,
    /// Old snapshots removed by retention
    pub pruned: Vec<String>,
}

impl BuildOutcome {
    /// True when some selected files are not in the snapshot
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Select, chunk, assemble, sign, publish.
///
/// Each build writes into a fresh store directory and only moves `current` once
/// the manifest, signature, feed and status are on disk. A failed build removes
/// its own directory and leaves the published snapshot alone.
pub struct SnapshotBuilder<'a> {
    config: &'a BuildConfig,
    key: &'a SigningKey,
    progress: Option<&'a ProgressBar>,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(config: &'a BuildConfig, key: &'a SigningKey) -> Self {
        Self {
            config,
            key,
            progress: None,
        }
    }

    /// Report the file being chunked on a spinner
    pub fn with_progress(mut self, progress: &'a ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(&self) -> Result<BuildOutcome> {
        self.build_at(Utc::now())
    }

    pub fn build_at(&self, built_at: DateTime<Utc>) -> Result<BuildOutcome> {
        self.config.validate()?;
        let chunker = Chunker::new(self.config.chunk_bytes)?;

        let root = self.config.root.canonicalize()
            .with_io_context(|| format!("resolving root {}", self.config.root.display()))?;
        let selector = PathSelector::new(&root, &self.config.include, &self.config.exclude)?;

        fs::create_dir_all(&self.config.out)
            .with_io_context(|| format!("creating output directory {}", self.config.out.display()))?;
        let out = self.config.out.canonicalize()
            .with_io_context(|| format!("resolving output directory {}", self.config.out.display()))?;
        let selector = selector.exclude_path(&out);

        let store = SnapshotStore::new(&out);
        let (id, dir) = store.create_snapshot(built_at)?;
        debug!(snapshot = %id, root = %root.display(), "building snapshot");

        let assembled = match self.assemble(&root, &selector, &chunker, &dir, built_at) {
            Ok(assembled) => assembled,
            Err(err) => {
                warn!(snapshot = %id, error = %err, "build failed, discarding snapshot");
                let _ = store.discard(&id);
                return Err(err);
            }
        };

        if let Err(err) = store.publish(&id) {
            let _ = store.discard(&id);
            return Err(err);
        }

        let pruned = match store.prune(self.config.keep_snapshots) {
            Ok(pruned) => pruned,
            Err(err) => {
                // the new snapshot is already live
                warn!(error = %err, "failed to prune old snapshots");
                Vec::new()
            }
        };

        let (status, skipped, warnings) = assembled;
        info!(
            snapshot = %id,
            files = status.files,
            chunks = status.chunks,
            bytes = status.bytes,
            skipped = skipped.len(),
            "build complete"
        );

        Ok(BuildOutcome {
            snapshot_id: id,
            snapshot_dir: dir,
            status,
            skipped,
            warnings,
            pruned,
        })
    }

    /// Write every artifact of one snapshot into `dir`
    fn assemble(
        &self,
        root: &Path,
        selector: &PathSelector,
        chunker: &Chunker,
        dir: &Path,
        built_at: DateTime<Utc>,
    ) -> Result<(Status, Vec<SkippedFile>, Vec<String>)> {
        let selection = selector.select();
        let mut builder = ManifestBuilder::new(root.display().to_string(), chunker.chunk_bytes());
        let mut namer = ArtifactNamer::new();

        for path in &selection.files {
            let rel = relative_slash_path(root, path);
            if let Some(pb) = self.progress {
                pb.set_message(format!("Chunking {}", rel));
            }

            let metadata = match fs::metadata(path) {
                Ok(metadata) => metadata,
                Err(err) => {
                    builder.skip_file(rel, err.to_string());
                    continue;
                }
            };
            let mtime: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or(built_at);

            let stem = namer.stem_for(&rel);
            match chunker.chunk_file(path, &rel, &stem, dir) {
                Ok(chunked) => builder.add_file(FileEntry {
                    path: rel,
                    size: chunked.size,
                    mtime,
                    sha256: chunked.sha256,
                    chunks: chunked.chunks,
                }),
                Err(SnapError::Io { source, .. }) => builder.skip_file(rel, source.to_string()),
                Err(err) => return Err(err),
            }
        }

        let (manifest, skipped) = builder.finish(built_at);
        let status = self.write_snapshot_files(&manifest, dir)?;
        Ok((status, skipped, selection.warnings))
    }

    fn write_snapshot_files(&self, manifest: &Manifest, dir: &Path) -> Result<Status> {
        if let Some(pb) = self.progress {
            pb.set_message("Signing manifest");
        }

        let manifest_bytes = manifest.to_bytes()?;
        write_artifact(dir, MANIFEST_FILE, &manifest_bytes)?;

        // sign the exact bytes that are on disk
        let signature = sign_manifest(&manifest_bytes, self.key);
        write_artifact(dir, SIGNATURE_FILE, signature.as_bytes())?;

        write_json_artifact(dir, FEED_FILE, &manifest.feed(self.config.feed_limit))?;

        let status = manifest.status();
        write_json_artifact(dir, STATUS_FILE, &status)?;
        Ok(status)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::manifest::Encoding;
    use crate::core::snapshot::{resolve_site, read_status};

    fn key() -> SigningKey {
        SigningKey::parse("test-key")
    }

    fn config(root: &Path, out: &Path) -> BuildConfig {
        let mut config = BuildConfig::new(root, out);
        config.chunk_bytes = 128;
        config
    }

    #[test]
    fn test_build_publishes_all_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("a.txt"), "hello world").unwrap();
        fs::write(root.join("docs/empty.md"), "").unwrap();
        let out = tmp.path().join("site");

        let config = config(&root, &out);
        let key = key();
        let outcome = SnapshotBuilder::new(&config, &key).build().unwrap();

        assert_eq!(outcome.status.files, 2);
        assert_eq!(outcome.status.chunks, 2);
        assert_eq!(outcome.status.bytes, 11);
        assert!(!outcome.is_partial());

        let site = resolve_site(&out).unwrap();
        for name in [MANIFEST_FILE, SIGNATURE_FILE, FEED_FILE, STATUS_FILE] {
            assert!(site.join(name).exists(), "{} missing", name);
        }
        assert_eq!(read_status(&site).unwrap(), outcome.status);

        let manifest = Manifest::from_bytes(&fs::read(site.join(MANIFEST_FILE)).unwrap()).unwrap();
        let empty = manifest.files.iter().find(|f| f.path == "docs/empty.md").unwrap();
        assert_eq!(empty.chunks[0].artifact_path, "chunks/docs__empty.md.1.txt");
        assert_eq!(empty.chunks[0].encoding, Encoding::Text);
    }

    #[test]
    fn test_output_inside_root_is_not_snapshotted() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::write(root.join("index.html"), "<html></html>").unwrap();
        let out = root.join("public");

        let config = config(root, &out);
        let key = key();
        SnapshotBuilder::new(&config, &key).build().unwrap();
        let second = SnapshotBuilder::new(&config, &key).build().unwrap();

        // the first snapshot must not leak into the second
        assert_eq!(second.status.files, 1);
    }

    #[test]
    fn test_unreadable_file_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("ok.txt"), "fine").unwrap();
        let locked = root.join("locked.txt");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores permission bits
        if fs::read(&locked).is_ok() {
            return;
        }

        let config = config(&root, &tmp.path().join("out"));
        let key = key();
        let outcome = SnapshotBuilder::new(&config, &key).build().unwrap();

        assert!(outcome.is_partial());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].path, "locked.txt");
        assert_eq!(outcome.status.files, 1);
    }

    #[test]
    fn test_failed_build_keeps_previous_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "v1").unwrap();
        let out = tmp.path().join("out");

        let good = config(&root, &out);
        let key = key();
        let first = SnapshotBuilder::new(&good, &key).build().unwrap();

        let mut bad = good.clone();
        bad.include = vec!["src/[".to_string()];
        assert!(SnapshotBuilder::new(&bad, &key).build().unwrap_err().is_config());

        let store = SnapshotStore::new(&out);
        assert_eq!(store.current_id().unwrap(), Some(first.snapshot_id));
        assert_eq!(store.list_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn test_retention_prunes_old_builds() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("src");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "x").unwrap();
        let out = tmp.path().join("out");

        let mut config = config(&root, &out);
        config.keep_snapshots = 2;
        let key = key();
        let base = Utc::now();
        let mut last = None;
        for n in 0..4 {
            let outcome = SnapshotBuilder::new(&config, &key)
                .build_at(base + chrono::Duration::seconds(n))
                .unwrap();
            last = Some(outcome);
        }

        let last = last.unwrap();
        assert_eq!(last.pruned.len(), 1);
        let store = SnapshotStore::new(&out);
        let ids = store.list_snapshots().unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids.last(), Some(&last.snapshot_id));
    }
}
