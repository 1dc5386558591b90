//! Content addressing: SHA-256 over file bytes and over chunk text.
//!
//! Hashes are lowercase hex. File hashing streams so a multi-megabyte source
//! file never needs to sit fully in memory just to be fingerprinted; line
//! endings are never normalized, so a CRLF/LF flip is a content change by
//! design (matches what a Merkle diff over a real checkout needs to see).

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::error::{IndexError, Result};

const STREAM_BUF_SIZE: usize = 64 * 1024;

/// SHA-256 of a file's bytes, lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|source| IndexError::FileReadFailure {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| IndexError::FileReadFailure {
                path: path.display().to_string(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of raw bytes (used for chunk text), lowercase hex.
pub fn sha256_text(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
