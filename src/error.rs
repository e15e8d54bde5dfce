use std::fmt;
use std::path::PathBuf;

/// Main error type for snapshot operations
#[derive(Debug)]
pub enum SnapError {
    Io {
        source: std::io::Error,
        context: String,
    },
    Config {
        message: String,
        path: Option<PathBuf>,
    },
    Validation {
        field: String,
        value: String,
        reason: String,
    },
    NotFound {
        resource: String,
        identifier: String,
    },
    Snapshot {
        id: Option<String>,
        operation: String,
        reason: String,
    },
    Serialization {
        what: String,
        source: serde_json::Error,
    },
    Watch {
        reason: String,
        source: Option<notify::Error>,
    },
    Generic {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SnapError {
    /// Configuration errors abort before any snapshot is written
    pub fn is_config(&self) -> bool {
        matches!(self, SnapError::Config { .. } | SnapError::Validation { .. })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SnapError::Config {
            message: message.into(),
            path: None,
        }
    }
}

impl fmt::Display for SnapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapError::Io { source, context } => {
                write!(f, "IO error during {}: {}", context, source)
            }
            SnapError::Config { message, path } => {
                if let Some(path) = path {
                    write!(f, "Configuration error in {}: {}", path.display(), message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            SnapError::Validation { field, value, reason } => {
                write!(f, "Configuration error: invalid {} '{}': {}", field, value, reason)
            }
            SnapError::NotFound { resource, identifier } => {
                write!(f, "{} '{}' not found", resource, identifier)
            }
            SnapError::Snapshot { id, operation, reason } => {
                if let Some(id) = id {
                    write!(f, "Snapshot '{}' error during {}: {}", id, operation, reason)
                } else {
                    write!(f, "Snapshot error during {}: {}", operation, reason)
                }
            }
            SnapError::Serialization { what, source } => {
                write!(f, "Failed to (de)serialize {}: {}", what, source)
            }
            SnapError::Watch { reason, .. } => {
                write!(f, "Watcher error: {}", reason)
            }
            SnapError::Generic { message, .. } => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for SnapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapError::Io { source, .. } => Some(source),
            SnapError::Serialization { source, .. } => Some(source),
            SnapError::Watch { source: Some(source), .. } => Some(source),
            SnapError::Generic { source: Some(source), .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapError>;

pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SnapError::Generic {
            message: f(),
            source: Some(Box::new(e)),
        })
    }

    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SnapError::Io {
            source: e,
            context: f(),
        })
    }
}

impl<T> ErrorContext<T> for std::result::Result<T, serde_json::Error> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| SnapError::Serialization {
            what: f(),
            source: e,
        })
    }

    fn with_io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.with_context(f)
    }
}

impl From<notify::Error> for SnapError {
    fn from(err: notify::Error) -> Self {
        SnapError::Watch {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}
