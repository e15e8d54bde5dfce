use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs as unix_fs;

use rand::{distributions::Alphanumeric, Rng};

use crate::error::{Result, SnapError, ErrorContext};

/// Point `link` at `target` without a window where `link` is missing.
///
/// A uniquely named temporary link is created next to `link` and renamed over
/// it; readers see either the old target or the new one.
pub fn swap_symlink(target: impl AsRef<Path>, link: impl AsRef<Path>) -> Result<()> {
    let link = link.as_ref();
    let target = target.as_ref();

    let parent = link.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_io_context(|| format!("creating parent directory {}", parent.display()))?;

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let file_name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "link".to_string());
    let staging = parent.join(format!(".{}.{}", file_name, suffix));

    create_dir_symlink(target, &staging)?;

    if let Err(err) = replace_link(&staging, link) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }

    Ok(())
}

#[cfg(unix)]
fn create_dir_symlink(target: &Path, link: &Path) -> Result<()> {
    unix_fs::symlink(target, link)
        .with_io_context(|| format!("creating symlink {} -> {}", link.display(), target.display()))
}

#[cfg(windows)]
fn create_dir_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
        .with_io_context(|| format!("creating symlink {} -> {}", link.display(), target.display()))
}

#[cfg(not(any(unix, windows)))]
fn create_dir_symlink(_target: &Path, _link: &Path) -> Result<()> {
    Err(SnapError::Snapshot {
        id: None,
        operation: "publish".to_string(),
        reason: "directory symlinks not supported on this platform".to_string(),
    })
}

#[cfg(unix)]
fn replace_link(staging: &Path, link: &Path) -> Result<()> {
    // rename(2) atomically replaces an existing symlink
    fs::rename(staging, link)
        .with_io_context(|| format!("publishing link {}", link.display()))
}

#[cfg(not(unix))]
fn replace_link(staging: &Path, link: &Path) -> Result<()> {
    if link.is_symlink() {
        fs::remove_dir(link)
            .or_else(|_| fs::remove_file(link))
            .with_io_context(|| format!("removing existing link {}", link.display()))?;
    }
    fs::rename(staging, link)
        .with_io_context(|| format!("publishing link {}", link.display()))
}

/// Check if a path is a symlink and return its target
pub fn read_symlink_target(link: &Path) -> Result<PathBuf> {
    if !link.is_symlink() {
        return Err(SnapError::Validation {
            field: "path".to_string(),
            value: link.display().to_string(),
            reason: "Path is not a symlink".to_string(),
        });
    }

    fs::read_link(link)
        .with_io_context(|| format!("reading symlink target for {}", link.display()))
}

/// Resolve a symlink to its final target
pub fn resolve_symlink(link: &Path) -> Result<PathBuf> {
    let target = read_symlink_target(link)?;

    let resolved = if target.is_absolute() {
        target
    } else {
        link.parent().unwrap_or_else(|| Path::new(".")).join(target)
    };

    resolved.canonicalize()
        .with_io_context(|| format!("resolving symlink {}", link.display()))
}
