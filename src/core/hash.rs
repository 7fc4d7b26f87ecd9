use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{ErrorContext, Result};

/// SHA-256 of a file's full content, streamed
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_io_context(|| format!("opening {} for hashing", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_io_context(|| format!("hashing {}", path.display()))?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// Generate a short hash (first 12 characters) for display purposes
pub fn short_hash(full_hash: &str) -> String {
    full_hash.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn compute_content_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    #[test]
    fn test_hash_file_matches_content_hash() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("data.bin");
        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        let hash = hash_file(&path).unwrap();
        assert_eq!(hash, compute_content_hash(&content));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_short_hash() {
        let full_hash = "a1b2c3d4e5f6789012345678901234567890abcdef1234567890abcdef123456";
        assert_eq!(short_hash(full_hash), "a1b2c3d4e5f6");
    }

    #[test]
    fn test_missing_file() {
        let tmp = tempdir().unwrap();
        let err = hash_file(&tmp.path().join("missing")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }
}
