use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, SnapError};

/// Characters that start a glob expression in `globset` syntax
const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Files picked by a [`PathSelector`] plus the non-fatal problems met on the way.
#[derive(Debug, Default)]
pub struct Selection {
    /// Absolute paths in discovery order
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// One include pattern: where to start walking and what to accept.
#[derive(Debug)]
struct IncludeRule {
    pattern: String,
    base: PathBuf,
    matcher: GlobSet,
}

/// Include/exclude resolution over a source tree.
///
/// Each include pattern is walked from its literal prefix and excluded directory
/// names prune whole subtrees. Results are deduplicated by canonical path.
#[derive(Debug)]
pub struct PathSelector {
    root: PathBuf,
    rules: Vec<IncludeRule>,
    excluded_names: HashSet<String>,
    excluded_paths: Vec<PathBuf>,
}

impl PathSelector {
    /// Compile include patterns (root-relative, `/`-separated) and the set of
    /// directory names to prune.
    pub fn new<P: AsRef<Path>>(root: P, includes: &[String], excludes: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if includes.is_empty() {
            return Err(SnapError::config("at least one include pattern is required"));
        }

        let mut rules = Vec::with_capacity(includes.len());
        for pattern in includes {
            rules.push(compile_rule(&root, pattern)?);
        }

        Ok(Self {
            root,
            rules,
            excluded_names: excludes.iter().cloned().collect(),
            excluded_paths: Vec::new(),
        })
    }

    /// Prune an absolute directory (typically the snapshot output) in addition
    /// to the excluded names.
    pub fn exclude_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            self.excluded_paths.push(canonical);
        }
        self.excluded_paths.push(path.to_path_buf());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True if any directory segment of `path` (relative to the root) is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components().any(|c| match c {
            Component::Normal(name) => self.excluded_names.contains(name.to_string_lossy().as_ref()),
            _ => false,
        })
    }

    /// Walk the tree and resolve the concrete file list.
    pub fn select(&self) -> Selection {
        let mut selection = Selection::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        for rule in &self.rules {
            if !rule.base.exists() {
                debug!(pattern = %rule.pattern, base = %rule.base.display(), "include base does not exist");
                continue;
            }
            if self.is_excluded(&rule.base) {
                debug!(pattern = %rule.pattern, "include base is excluded");
                continue;
            }

            let walker = WalkDir::new(&rule.base)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    // the walk base itself is already vetted
                    entry.depth() == 0 || !entry.file_type().is_dir() || !self.is_excluded(entry.path())
                });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        let message = describe_walk_error(&err);
                        warn!(pattern = %rule.pattern, "{}", message);
                        selection.warnings.push(message);
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                let rel = relative_slash_path(&self.root, entry.path());
                if !rule.matcher.is_match(&rel) {
                    continue;
                }

                let canonical = match entry.path().canonicalize() {
                    Ok(path) => path,
                    Err(err) => {
                        let message = format!("cannot resolve {}: {}", entry.path().display(), err);
                        warn!("{}", message);
                        selection.warnings.push(message);
                        continue;
                    }
                };

                if self.excluded_paths.iter().any(|p| canonical.starts_with(p)) {
                    continue;
                }

                if seen.insert(canonical) {
                    selection.files.push(entry.into_path());
                }
            }
        }

        debug!(files = selection.files.len(), warnings = selection.warnings.len(), "selection complete");
        selection
    }
}

fn compile_rule(root: &Path, pattern: &str) -> Result<IncludeRule> {
    let trimmed = pattern.trim_start_matches("./").trim_start_matches('/');
    let mut patterns = vec![trimmed.to_string()];

    // `dir/**` also covers the files directly inside `dir`
    if let Some(base) = trimmed.strip_suffix("/**") {
        patterns.push(format!("{}/*", base));
    }

    let mut builder = GlobSetBuilder::new();
    for p in &patterns {
        let glob = GlobBuilder::new(p).literal_separator(true).build().map_err(|e| SnapError::Validation {
            field: "include pattern".to_string(),
            value: pattern.to_string(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    let matcher = builder.build().map_err(|e| SnapError::Validation {
        field: "include pattern".to_string(),
        value: pattern.to_string(),
        reason: e.to_string(),
    })?;

    Ok(IncludeRule {
        pattern: pattern.to_string(),
        base: root.join(literal_prefix(trimmed)),
        matcher,
    })
}

/// Leading path segments of a pattern that contain no glob syntax.
fn literal_prefix(pattern: &str) -> PathBuf {
    pattern
        .split('/')
        .take_while(|segment| !segment.contains(GLOB_META))
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

/// Root-relative path with forward slashes regardless of platform.
pub fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn describe_walk_error(err: &walkdir::Error) -> String {
    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());

    if let Some(ancestor) = err.loop_ancestor() {
        format!("skipping symlink loop at {} (points back to {})", path, ancestor.display())
    } else if let Some(io) = err.io_error() {
        format!("skipping {}: {}", path, io)
    } else {
        format!("skipping {}: {}", path, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, rel.as_bytes()).unwrap();
    }

    fn rel_names(root: &Path, selection: &Selection) -> Vec<String> {
        let mut names: Vec<String> = selection
            .files
            .iter()
            .map(|p| relative_slash_path(root, p))
            .collect();
        names.sort();
        names
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("docs/**"), PathBuf::from("docs"));
        assert_eq!(literal_prefix("src/core/*.rs"), PathBuf::from("src/core"));
        assert_eq!(literal_prefix("**/*.md"), PathBuf::new());
        assert_eq!(literal_prefix("README.md"), PathBuf::from("README.md"));
    }

    #[test]
    fn test_excluded_directories_are_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "src/main.rs");
        touch(root, "node_modules/pkg/index.js");
        touch(root, "src/node_modules/nested.js");
        touch(root, ".git/HEAD");

        let selector = PathSelector::new(
            root,
            &strings(&["**"]),
            &strings(&["node_modules", ".git"]),
        )
        .unwrap();
        let selection = selector.select();

        assert_eq!(rel_names(root, &selection), vec!["src/main.rs"]);
        assert!(selection.warnings.is_empty());
    }

    #[test]
    fn test_overlapping_patterns_are_deduplicated() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "docs/guide.md");
        touch(root, "docs/api/index.md");
        touch(root, "notes.txt");

        let selector = PathSelector::new(
            root,
            &strings(&["docs/**", "**/*.md", "docs/guide.md"]),
            &[],
        )
        .unwrap();
        let selection = selector.select();

        assert_eq!(selection.files.len(), 2);
        assert_eq!(rel_names(root, &selection), vec!["docs/api/index.md", "docs/guide.md"]);
    }

    #[test]
    fn test_recursive_pattern_includes_base_directory_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "assets/logo.svg");
        touch(root, "assets/img/photo.jpg");
        touch(root, "other/skip.txt");

        let selector = PathSelector::new(root, &strings(&["assets/**"]), &[]).unwrap();
        let selection = selector.select();

        assert_eq!(rel_names(root, &selection), vec!["assets/img/photo.jpg", "assets/logo.svg"]);
    }

    #[test]
    fn test_missing_base_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let selector = PathSelector::new(tmp.path(), &strings(&["nope/**"]), &[]).unwrap();
        let selection = selector.select();
        assert!(selection.files.is_empty());
        assert!(selection.warnings.is_empty());
    }

    #[test]
    fn test_output_directory_is_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "page.html");
        touch(root, "site/store/x/manifest.json");

        let selector = PathSelector::new(root, &strings(&["**"]), &[])
            .unwrap()
            .exclude_path(root.join("site"));
        let selection = selector.select();

        assert_eq!(rel_names(root, &selection), vec!["page.html"]);
        assert!(selector.is_excluded(&root.join("site").canonicalize().unwrap().join("a.txt")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = PathSelector::new(tmp.path(), &strings(&["src/[abc"]), &[]).unwrap_err();
        assert!(err.is_config());

        let err = PathSelector::new(tmp.path(), &[], &[]).unwrap_err();
        assert!(err.is_config());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "a/file.txt");
        std::os::unix::fs::symlink(root.join("a"), root.join("a/loop")).unwrap();

        let selector = PathSelector::new(root, &strings(&["**"]), &[]).unwrap();
        let selection = selector.select();

        assert_eq!(rel_names(root, &selection), vec!["a/file.txt"]);
        assert_eq!(selection.warnings.len(), 1);
        assert!(selection.warnings[0].contains("symlink loop"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_file_counted_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        touch(root, "real.txt");
        std::os::unix::fs::symlink(root.join("real.txt"), root.join("alias.txt")).unwrap();

        let selector = PathSelector::new(root, &strings(&["**"]), &[]).unwrap();
        assert_eq!(selector.select().files.len(), 1);
    }
}
