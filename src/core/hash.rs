use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use sha2::{Digest, Sha256};

use crate::error::{Result, ErrorContext};

/// Read block size for streaming digests
pub const HASH_BLOCK_BYTES: usize = 64 * 1024;

/// Compute hash for arbitrary content held in memory
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    format!("{:x}", digest)
}

/// Hash a byte stream in fixed-size blocks so memory use does not grow with input size.
pub fn sha256_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; HASH_BLOCK_BYTES];

    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&block[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash a file on disk
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_io_context(|| format!("opening {}", path.display()))?;
    sha256_reader(file)
        .with_io_context(|| format!("hashing {}", path.display()))
}

/// Generate a short hash (first 12 characters) for display purposes
pub fn short_hash(full_hash: &str) -> String {
    full_hash.chars().take(12).collect()
}

/// Validate hash format (64 character hex string)
pub fn validate_hash_format(hash: &str) -> bool {
    hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())
}
