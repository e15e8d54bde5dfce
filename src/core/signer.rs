use std::fmt;
use std::fs;
use std::path::PathBuf;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, SnapError, ErrorContext};

type HmacSha256 = Hmac<Sha256>;

/// Environment variable consulted when no key flag is given
pub const KEY_ENV_VAR: &str = "SNAPSEAL_KEY";

/// A signing key after its textual form has been interpreted.
///
/// Exactly 64 hex characters decode to 32 raw bytes; anything else is used as
/// its UTF-8 bytes. The two readings sign differently, so the choice is made
/// once in [`SigningKey::parse`].
#[derive(Clone, PartialEq, Eq)]
pub enum SigningKey {
    /// Decoded from a 64 character hex string
    Hex(Vec<u8>),
    /// Literal UTF-8 bytes of the key string
    Raw(Vec<u8>),
}

impl SigningKey {
    pub fn parse(text: &str) -> Self {
        if text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(bytes) = hex::decode(text) {
                return SigningKey::Hex(bytes);
            }
        }
        SigningKey::Raw(text.as_bytes().to_vec())
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            SigningKey::Hex(bytes) | SigningKey::Raw(bytes) => bytes,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SigningKey::Hex(_) => "hex",
            SigningKey::Raw(_) => "raw",
        }
    }
}

// never print key material
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey::{}({} bytes)", self.kind(), self.bytes().len())
    }
}

/// Where the signing key comes from.
pub trait KeySource {
    fn resolve(&self) -> Result<SigningKey>;
}

/// Key given directly, e.g. on the command line
pub struct LiteralKey(pub String);

impl KeySource for LiteralKey {
    fn resolve(&self) -> Result<SigningKey> {
        if self.0.is_empty() {
            return Err(SnapError::config("signing key is empty"));
        }
        Ok(SigningKey::parse(&self.0))
    }
}

/// Key read from a file provisioned by a secret store; one trailing newline is ignored.
pub struct FileKey(pub PathBuf);

impl KeySource for FileKey {
    fn resolve(&self) -> Result<SigningKey> {
        let content = fs::read_to_string(&self.0)
            .with_io_context(|| format!("reading key file {}", self.0.display()))?;
        let text = content
            .strip_suffix("\r\n")
            .or_else(|| content.strip_suffix('\n'))
            .unwrap_or(&content);
        if text.is_empty() {
            return Err(SnapError::Config {
                message: "key file is empty".to_string(),
                path: Some(self.0.clone()),
            });
        }
        Ok(SigningKey::parse(text))
    }
}

/// Key read from an environment variable
pub struct EnvKey(pub String);

impl Default for EnvKey {
    fn default() -> Self {
        EnvKey(KEY_ENV_VAR.to_string())
    }
}

impl KeySource for EnvKey {
    fn resolve(&self) -> Result<SigningKey> {
        match std::env::var(&self.0) {
            Ok(value) if !value.is_empty() => Ok(SigningKey::parse(&value)),
            _ => Err(SnapError::config(format!(
                "no signing key given (use --key, --key-file or set {})",
                self.0
            ))),
        }
    }
}

/// An already resolved key, used by tests and embedders
impl KeySource for SigningKey {
    fn resolve(&self) -> Result<SigningKey> {
        Ok(self.clone())
    }
}

fn mac_for(key: &SigningKey) -> HmacSha256 {
    // HMAC accepts keys of any length
    <HmacSha256 as Mac>::new_from_slice(key.bytes()).expect("HMAC can take key of any size")
}

/// Base64 HMAC-SHA256 of the exact manifest bytes
pub fn sign_manifest(manifest_bytes: &[u8], key: &SigningKey) -> String {
    let mut mac = mac_for(key);
    mac.update(manifest_bytes);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Constant-time check of a stored signature; undecodable signatures never match.
pub fn verify_signature(manifest_bytes: &[u8], key: &SigningKey, signature: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let mut mac = mac_for(key);
    mac.update(manifest_bytes);
    mac.verify_slice(&expected).is_ok()
}
