pub mod build;
pub mod watch;
pub mod serve;
pub mod verify;
pub mod status;

pub use build::*;
pub use watch::*;
pub use serve::*;
pub use verify::*;
pub use status::*;

use tracing::debug;

use crate::cli::commands::KeyArgs;
use crate::config::SnapConfig;
use crate::core::signer::{EnvKey, FileKey, KeySource, LiteralKey, SigningKey};
use crate::error::Result;

/// `--key`, then `--key-file`, then `[build] key_file`, then the environment
pub fn resolve_key(args: &KeyArgs, config: &SnapConfig) -> Result<SigningKey> {
    let source: Box<dyn KeySource> = if let Some(key) = &args.key {
        Box::new(LiteralKey(key.clone()))
    } else if let Some(path) = args.key_file.as_ref().or(config.build.key_file.as_ref()) {
        Box::new(FileKey(path.clone()))
    } else {
        Box::new(EnvKey::default())
    };

    let key = source.resolve()?;
    debug!(kind = key.kind(), "resolved signing key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_key_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("key");
        std::fs::write(&path, "from-file\n").unwrap();

        let mut config = SnapConfig::default();
        config.build.key_file = Some(path.clone());

        let args = KeyArgs { key: Some("from-flag".to_string()), key_file: None };
        assert_eq!(resolve_key(&args, &config).unwrap().bytes(), b"from-flag");

        let args = KeyArgs::default();
        assert_eq!(resolve_key(&args, &config).unwrap().bytes(), b"from-file");
    }
}
