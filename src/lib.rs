// Core modules
pub mod error;
pub mod config;
pub mod core;

pub mod cli;
pub mod server;

// Re-exports for convenience
pub use error::{SnapError, Result};
pub use config::{BuildConfig, SnapConfig};
pub use core::{SnapshotBuilder, SigningKey, Verifier};
