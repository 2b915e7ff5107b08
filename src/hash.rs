//! Content hashing for ROM identification.
//!
//! Catalog entries record the SHA-1 of the unpatched source ROM as 40
//! uppercase hex characters. This module computes the same digest for files
//! on disk so they can be looked up by content.

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Length of a SHA-1 digest in hex characters.
pub const SHA1_HEX_LEN: usize = 40;

/// Compute the SHA-1 of a file and return it as uppercase hex.
///
/// Uses streaming to handle large files without loading into memory.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(1024 * 1024, file); // 1MB buffer
    let mut buf = vec![0u8; 1024 * 1024];
    let mut hasher = Sha1::new();

    loop {
        let bytes_read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buf[..bytes_read]);
    }

    Ok(hex::encode_upper(hasher.finalize()))
}

/// SHA-1 of an in-memory buffer, uppercase hex.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode_upper(Sha1::digest(data))
}

/// Normalise a recorded hash for comparison (trimmed, uppercase).
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_ascii_uppercase()
}

/// Whether `hash` looks like a SHA-1 digest (40 hex chars, any case).
pub fn is_valid_sha1(hash: &str) -> bool {
    hash.len() == SHA1_HEX_LEN && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_compute_hash_empty_file() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.flush()?;

        let hash = compute_file_hash(tmp.path())?;
        assert_eq!(hash, "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709");
        Ok(())
    }

    #[test]
    fn test_compute_hash_known_value() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"abc")?;
        tmp.flush()?;

        let hash = compute_file_hash(tmp.path())?;
        assert_eq!(hash, "A9993E364706816ABA3E25717850C26C9CD0D89D");
        assert_eq!(hash, hash_bytes(b"abc"));
        Ok(())
    }

    #[test]
    fn test_hash_larger_than_buffer() -> Result<()> {
        let data: Vec<u8> = (0..(3 * 1024 * 1024 + 17)).map(|i| (i % 251) as u8).collect();
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(&data)?;
        tmp.flush()?;

        assert_eq!(compute_file_hash(tmp.path())?, hash_bytes(&data));
        Ok(())
    }

    #[test]
    fn test_sha1_validation() {
        assert!(is_valid_sha1("A9993E364706816ABA3E25717850C26C9CD0D89D"));
        assert!(is_valid_sha1("a9993e364706816aba3e25717850c26c9cd0d89d"));
        assert!(!is_valid_sha1(""));
        assert!(!is_valid_sha1("A9993E36"));
        assert!(!is_valid_sha1("Z9993E364706816ABA3E25717850C26C9CD0D89D"));
    }

    #[test]
    fn test_normalize_hash() {
        assert_eq!(normalize_hash(" abc123 "), "ABC123");
    }
}
