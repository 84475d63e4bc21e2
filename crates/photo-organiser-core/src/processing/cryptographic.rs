/// Content hashing used to verify copies byte-for-byte
use crate::error::Result;
use blake3::Hash as Blake3Hash;

use std::{fs::File, io::Read, path::Path};

/// Compute the cryptographic hash of a file using the Blake3 algorithm
pub fn compute_cryptographic<P: AsRef<Path>>(path: P) -> Result<Blake3Hash> {
    // Open the file with explicit scope to ensure it's closed promptly
    let hash = {
        let mut file = File::open(&path)?;

        let mut hasher = blake3::Hasher::new();

        // Read the file in chunks and update the hasher
        let mut buffer = [0; 8192]; // 8KB buffer
        loop {
            let bytes_read = file.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        hasher.finalize()
    };

    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_same_content_same_hash() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"identical bytes").unwrap();
        std::fs::write(&b, b"identical bytes").unwrap();

        assert_eq!(compute_cryptographic(&a).unwrap(), compute_cryptographic(&b).unwrap());
    }

    #[test]
    fn test_matches_in_memory_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        let data = vec![7u8; 20_000];
        std::fs::write(&path, &data).unwrap();

        assert_eq!(compute_cryptographic(&path).unwrap(), blake3::hash(&data));
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(compute_cryptographic("/no/such/file.jpg").is_err());
    }
}
