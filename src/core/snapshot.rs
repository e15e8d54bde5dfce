use std::fs;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Serialize;
use tracing::{debug, info};

use crate::core::manifest::Status;
use crate::core::symlink::{read_symlink_target, resolve_symlink, swap_symlink};
use crate::error::{Result, SnapError, ErrorContext};

pub const STORE_DIR: &str = "store";
pub const CURRENT_LINK: &str = "current";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "manifest.sig";
pub const FEED_FILE: &str = "feed.json";
pub const STATUS_FILE: &str = "status.json";

/// Layout of an output directory:
///
/// ```text
/// <out>/store/<id>/    one directory per build
/// <out>/current        symlink to the published store entry
/// ```
pub struct SnapshotStore {
    out: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(out: P) -> Self {
        Self {
            out: out.as_ref().to_path_buf(),
        }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.out.join(STORE_DIR)
    }

    pub fn current_link(&self) -> PathBuf {
        self.out.join(CURRENT_LINK)
    }

    /// Create a fresh, unpublished snapshot directory
    pub fn create_snapshot(&self, built_at: DateTime<Utc>) -> Result<(String, PathBuf)> {
        create_snapshot_dir(&self.out, built_at)
    }

    /// Make `id` the published snapshot
    pub fn publish(&self, id: &str) -> Result<()> {
        let dir = self.store_dir().join(id);
        if !dir.join(SIGNATURE_FILE).exists() {
            return Err(SnapError::Snapshot {
                id: Some(id.to_string()),
                operation: "publish".to_string(),
                reason: "snapshot is incomplete (no signature)".to_string(),
            });
        }

        swap_symlink(Path::new(STORE_DIR).join(id), self.current_link())?;
        info!(snapshot = id, "published snapshot");
        Ok(())
    }

    /// Remove an unpublished snapshot, e.g. after a failed build
    pub fn discard(&self, id: &str) -> Result<()> {
        if self.current_id()?.as_deref() == Some(id) {
            return Err(SnapError::Snapshot {
                id: Some(id.to_string()),
                operation: "discard".to_string(),
                reason: "snapshot is currently published".to_string(),
            });
        }

        let dir = self.store_dir().join(id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_io_context(|| format!("removing snapshot directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Id of the published snapshot, if any
    pub fn current_id(&self) -> Result<Option<String>> {
        let link = self.current_link();
        if !link.is_symlink() {
            return Ok(None);
        }

        let target = read_symlink_target(&link)?;
        Ok(target.file_name().map(|n| n.to_string_lossy().into_owned()))
    }

    /// All snapshot ids in the store, oldest first
    pub fn list_snapshots(&self) -> Result<Vec<String>> {
        let store_dir = self.store_dir();
        let mut ids = Vec::new();

        if !store_dir.exists() {
            return Ok(ids);
        }

        let entries = fs::read_dir(&store_dir)
            .with_io_context(|| format!("reading store directory {}", store_dir.display()))?;

        for entry in entries {
            let entry = entry
                .with_io_context(|| "reading store entry".to_string())?;

            if entry.file_type()
                .with_io_context(|| "getting file type for store entry".to_string())?
                .is_dir()
            {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        // ids start with the build timestamp
        ids.sort();
        Ok(ids)
    }

    /// Keep the newest `keep` snapshots plus the published one; remove the rest.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>> {
        let current = self.current_id()?;
        let ids = self.list_snapshots()?;
        let keep_from = ids.len().saturating_sub(keep.max(1));
        let mut removed = Vec::new();

        for (index, id) in ids.iter().enumerate() {
            if index >= keep_from || current.as_deref() == Some(id.as_str()) {
                continue;
            }
            let dir = self.store_dir().join(id);
            fs::remove_dir_all(&dir)
                .with_io_context(|| format!("removing old snapshot {}", dir.display()))?;
            debug!(snapshot = %id, "pruned snapshot");
            removed.push(id.clone());
        }

        Ok(removed)
    }
}

/// Create a new snapshot directory in the output store.
///
/// Ids are `<built_at>-<random>` so that lexical order is build order.
pub fn create_snapshot_dir(out: &Path, built_at: DateTime<Utc>) -> Result<(String, PathBuf)> {
    let store = out.join(STORE_DIR);

    fs::create_dir_all(&store)
        .with_io_context(|| format!("creating store directory {}", store.display()))?;

    let rand: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();

    let id = format!("{}-{}", built_at.format("%Y%m%dT%H%M%S%3fZ"), rand);
    let dir = store.join(&id);

    fs::create_dir(&dir)
        .with_io_context(|| format!("creating snapshot directory {}", dir.display()))?;

    Ok((id, dir))
}

/// Accept either a snapshot directory or an output directory with a `current` link
pub fn resolve_site(path: &Path) -> Result<PathBuf> {
    let link = path.join(CURRENT_LINK);
    if link.is_symlink() {
        return resolve_symlink(&link);
    }
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }
    Err(SnapError::NotFound {
        resource: "snapshot".to_string(),
        identifier: path.display().to_string(),
    })
}

/// Write one published artifact into a snapshot directory
pub fn write_artifact(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let path = dir.join(name);
    fs::write(&path, bytes).map_err(|e| SnapError::Snapshot {
        id: dir.file_name().map(|n| n.to_string_lossy().into_owned()),
        operation: format!("writing {}", name),
        reason: e.to_string(),
    })
}

pub fn write_json_artifact<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| name.to_string())?;
    write_artifact(dir, name, &bytes)
}

/// Read `status.json` from a published snapshot
pub fn read_status(site: &Path) -> Result<Status> {
    let path = site.join(STATUS_FILE);
    if !path.exists() {
        return Err(SnapError::NotFound {
            resource: "status".to_string(),
            identifier: path.display().to_string(),
        });
    }
    let bytes = fs::read(&path)
        .with_io_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| STATUS_FILE.to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn complete(store: &SnapshotStore, secs: i64) -> String {
        let built_at = Utc.timestamp_opt(secs, 0).unwrap();
        let (id, dir) = store.create_snapshot(built_at).unwrap();
        write_artifact(&dir, SIGNATURE_FILE, b"sig").unwrap();
        id
    }

    #[test]
    fn test_ids_sort_in_build_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let first = complete(&store, 1_000);
        let second = complete(&store, 2_000);

        assert!(first.starts_with("19700101T001640000Z-"));
        assert_eq!(store.list_snapshots().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_publish_requires_signature() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let (id, _dir) = store.create_snapshot(Utc::now()).unwrap();

        assert!(store.publish(&id).is_err());
        assert_eq!(store.current_id().unwrap(), None);
    }

    #[test]
    fn test_publish_and_resolve_site() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let id = complete(&store, 10);
        store.publish(&id).unwrap();

        assert_eq!(store.current_id().unwrap(), Some(id.clone()));
        let site = resolve_site(tmp.path()).unwrap();
        assert_eq!(site, store.store_dir().join(&id).canonicalize().unwrap());
        // a snapshot directory resolves to itself
        assert_eq!(resolve_site(&site).unwrap(), site);
        assert!(resolve_site(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn test_prune_keeps_newest_and_current() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let ids: Vec<String> = (1..=4).map(|n| complete(&store, n * 100)).collect();

        // publish the oldest, it must survive pruning
        store.publish(&ids[0]).unwrap();
        let removed = store.prune(2).unwrap();

        assert_eq!(removed, vec![ids[1].clone()]);
        assert_eq!(
            store.list_snapshots().unwrap(),
            vec![ids[0].clone(), ids[2].clone(), ids[3].clone()]
        );
    }

    #[test]
    fn test_discard_refuses_published_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(tmp.path());
        let id = complete(&store, 5);
        store.publish(&id).unwrap();
        assert!(store.discard(&id).is_err());

        let other = complete(&store, 6);
        store.discard(&other).unwrap();
        assert!(!store.store_dir().join(&other).exists());
    }
}
