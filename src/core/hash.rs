// Hashing utilities for the ledger

use sha2::{Digest, Sha256};
use crate::core::HexHash;

/// Single SHA256 hash
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// SHA256 rendered as 64 lowercase hex characters
pub fn sha256_hex(data: &[u8]) -> HexHash {
    HexHash::from_digest(&sha256_hash(data))
}

/// Salted SHA256, used for password hashing
pub fn salted_sha256(data: &[u8], salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update(salt);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hasher.finalize());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_vector() {
        let hash = sha256_hex(b"abc");
        assert_eq!(
            hash.as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_empty() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_salted_hash_depends_on_salt() {
        let a = salted_sha256(b"secret", &[1u8; 16]);
        let b = salted_sha256(b"secret", &[2u8; 16]);
        assert_ne!(a, b);
        assert_eq!(a, salted_sha256(b"secret", &[1u8; 16]));
    }
}
