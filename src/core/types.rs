// Basic types for the medical ledger

use std::fmt;

/// Maximum number of transactions in one block
pub const MAX_TRANSACTIONS: usize = 10;

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_SIZE: usize = 64;

/// Longest accepted patient id / record type, in bytes
pub const MAX_FIELD_LEN: usize = 31;

/// Longest accepted plaintext record, in bytes
pub const MAX_RECORD_LEN: usize = 255;

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size
pub const IV_SIZE: usize = 16;

/// Fixed on-disk slot for ciphertext bytes
pub const PAYLOAD_SLOT_SIZE: usize = 256;

/// Hex-encoded block digest (64 ASCII characters)
///
/// A block that has never been hashed carries `HexHash::empty()`, which is
/// all NUL bytes and never equals a real digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexHash([u8; HASH_HEX_SIZE]);

impl HexHash {
    /// Placeholder for a block that has not been hashed yet
    pub fn empty() -> Self {
        Self([0u8; HASH_HEX_SIZE])
    }

    /// Sentinel used as the genesis block's previous hash
    pub fn zero() -> Self {
        Self([b'0'; HASH_HEX_SIZE])
    }

    /// Build from a 32-byte raw digest
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut out = [0u8; HASH_HEX_SIZE];
        // hex::encode_to_slice only fails on a length mismatch
        hex::encode_to_slice(digest, &mut out).expect("64 hex chars for 32 bytes");
        Self(out)
    }

    /// Parse a 64-character lowercase hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, String> {
        Self::from_bytes(hex_str.as_bytes())
    }

    /// Validate raw ASCII bytes as a digest (or the empty placeholder)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != HASH_HEX_SIZE {
            return Err(format!(
                "Invalid hash length: expected {}, got {}",
                HASH_HEX_SIZE,
                bytes.len()
            ));
        }
        let mut out = [0u8; HASH_HEX_SIZE];
        out.copy_from_slice(bytes);
        let hash = Self(out);
        if hash.is_empty() {
            return Ok(hash);
        }
        if !bytes.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err("Invalid hash: expected lowercase hex characters".to_string());
        }
        Ok(hash)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_HEX_SIZE] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        if self.is_empty() {
            return "";
        }
        // only ever holds ASCII hex, checked on construction
        std::str::from_utf8(&self.0).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Number of leading '0' characters
    pub fn leading_zeros(&self) -> usize {
        self.0.iter().take_while(|b| **b == b'0').count()
    }
}

impl Default for HexHash {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for HexHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for HexHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HexHash({})", self.as_str())
    }
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
