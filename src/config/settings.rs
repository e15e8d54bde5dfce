use std::path::{Path, PathBuf};
use std::fs;
use serde::{Deserialize, Serialize};

use crate::core::manifest::DEFAULT_FEED_LIMIT;
use crate::error::{Result, SnapError, ErrorContext};

/// Config file picked up from the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "snapseal.toml";

/// Main snapseal configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub build: BuildSettings,
    pub verify: VerifySettings,
    pub watch: WatchSettings,
    pub serve: ServeSettings,
    pub ui: UiConfig,
}

/// What to snapshot and where to put it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Source tree to snapshot
    pub root: Option<PathBuf>,
    /// Output directory holding `store/` and the `current` pointer
    pub out: Option<PathBuf>,
    /// Chunk size in bytes
    pub chunk_bytes: usize,
    /// Root-relative glob patterns
    pub include: Vec<String>,
    /// Directory names pruned wherever they appear
    pub exclude: Vec<String>,
    /// Maximum entries in feed.json
    pub feed_limit: usize,
    /// Published snapshots kept in the store, current one included
    pub keep_snapshots: usize,
    /// Path of a file holding the signing key
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    /// Number of chunks sampled per run
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Quiet period before a burst of changes triggers a rebuild
    pub debounce_ms: u64,
    /// How long the watch loop waits for events before checking the debouncer
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    pub bind: String,
    pub port: u16,
}

/// UI and display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Whether to show colored output
    pub colored: bool,
    /// Whether to show progress spinners
    pub progress_bars: bool,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            root: None,
            out: None,
            chunk_bytes: 64 * 1024,
            include: vec!["**".to_string()],
            exclude: [".git", "node_modules", "target", "__pycache__", ".venv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            feed_limit: DEFAULT_FEED_LIMIT,
            keep_snapshots: 5,
            key_file: None,
        }
    }
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self { samples: 64 }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            poll_interval_ms: 200,
        }
    }
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            colored: std::env::var("NO_COLOR").is_err(),
            progress_bars: true,
            log_level: "warn".to_string(),
        }
    }
}

impl SnapConfig {
    /// Load configuration from file or fall back to defaults if it does not exist
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_io_context(|| format!("reading config file {}", config_path.display()))?;

            toml::from_str(&content)
                .map_err(|e| SnapError::Config {
                    message: format!("Invalid TOML: {}", e),
                    path: Some(config_path.to_path_buf()),
                })
        } else {
            Ok(Self::default())
        }
    }

    /// Load an explicitly named file (which must exist) or the default file if present
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(SnapError::Config {
                message: "config file does not exist".to_string(),
                path: Some(path.to_path_buf()),
            }),
            Some(path) => Self::load(path),
            None => Self::load(DEFAULT_CONFIG_FILE),
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, config_path: P) -> Result<()> {
        let config_path = config_path.as_ref();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_io_context(|| format!("creating config directory {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SnapError::Config {
                message: format!("Failed to serialize config: {}", e),
                path: Some(config_path.to_path_buf()),
            })?;

        fs::write(config_path, content)
            .with_io_context(|| format!("writing config file {}", config_path.display()))?;

        Ok(())
    }
}

/// Fully resolved settings for one build
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub out: PathBuf,
    pub chunk_bytes: usize,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub feed_limit: usize,
    pub keep_snapshots: usize,
}

impl BuildConfig {
    /// Defaults for everything but the two required directories
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(root: P, out: Q) -> Self {
        let defaults = BuildSettings::default();
        Self {
            root: root.as_ref().to_path_buf(),
            out: out.as_ref().to_path_buf(),
            chunk_bytes: defaults.chunk_bytes,
            include: defaults.include,
            exclude: defaults.exclude,
            feed_limit: defaults.feed_limit,
            keep_snapshots: defaults.keep_snapshots,
        }
    }

    pub fn from_settings(settings: &BuildSettings) -> Result<Self> {
        let root = settings
            .root
            .clone()
            .ok_or_else(|| SnapError::config("no source root given (--root or [build] root)"))?;
        let out = settings
            .out
            .clone()
            .ok_or_else(|| SnapError::config("no output directory given (--out or [build] out)"))?;

        Ok(Self {
            root,
            out,
            chunk_bytes: settings.chunk_bytes,
            include: settings.include.clone(),
            exclude: settings.exclude.clone(),
            feed_limit: settings.feed_limit,
            keep_snapshots: settings.keep_snapshots,
        })
    }

    /// Check everything that can be checked before touching the output directory
    pub fn validate(&self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(SnapError::Validation {
                field: "root".to_string(),
                value: self.root.display().to_string(),
                reason: "not an existing directory".to_string(),
            });
        }
        if self.chunk_bytes == 0 {
            return Err(SnapError::Validation {
                field: "chunk size".to_string(),
                value: "0".to_string(),
                reason: "must be a positive number of bytes".to_string(),
            });
        }
        if self.include.is_empty() {
            return Err(SnapError::config("at least one include pattern is required"));
        }
        if self.feed_limit == 0 {
            return Err(SnapError::Validation {
                field: "feed_limit".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.keep_snapshots == 0 {
            return Err(SnapError::Validation {
                field: "keep_snapshots".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.out.exists() && !self.out.is_dir() {
            return Err(SnapError::Validation {
                field: "out".to_string(),
                value: self.out.display().to_string(),
                reason: "exists and is not a directory".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapseal.toml");
        fs::write(
            &path,
            "[build]\nroot = \"/srv/docs\"\nchunk_bytes = 4096\n\n[verify]\nsamples = 10\n",
        )
        .unwrap();

        let config = SnapConfig::load(&path).unwrap();
        assert_eq!(config.build.root, Some(PathBuf::from("/srv/docs")));
        assert_eq!(config.build.chunk_bytes, 4096);
        assert_eq!(config.build.include, vec!["**".to_string()]);
        assert_eq!(config.build.keep_snapshots, 5);
        assert_eq!(config.verify.samples, 10);
        assert_eq!(config.watch.debounce_ms, 500);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "[build\nroot = ").unwrap();
        assert!(SnapConfig::load(&path).unwrap_err().is_config());
        assert!(SnapConfig::discover(Some(&tmp.path().join("absent.toml"))).unwrap_err().is_config());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("snapseal.toml");
        let mut config = SnapConfig::default();
        config.build.exclude.push("dist".to_string());
        config.save(&path).unwrap();

        let loaded = SnapConfig::load(&path).unwrap();
        assert!(loaded.build.exclude.contains(&"dist".to_string()));
    }

    #[test]
    fn test_build_config_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = BuildConfig::new(tmp.path(), tmp.path().join("out"));
        assert!(config.validate().is_ok());

        config.chunk_bytes = 0;
        assert!(config.validate().unwrap_err().is_config());

        let missing = BuildConfig::new(tmp.path().join("missing"), tmp.path().join("out"));
        assert!(missing.validate().unwrap_err().is_config());

        let mut config = BuildConfig::new(tmp.path(), tmp.path().join("out"));
        config.keep_snapshots = 0;
        assert!(config.validate().unwrap_err().is_config());

        assert!(BuildConfig::from_settings(&BuildSettings::default()).unwrap_err().is_config());
    }
}
