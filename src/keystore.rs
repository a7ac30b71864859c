// Payload key management

use crate::core::{PayloadKey, KEY_SIZE};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk key file
#[derive(Serialize, Deserialize)]
struct KeyFile {
    /// Hex-encoded 32-byte AES key
    key: String,
}

/// Generate a new payload key and write it to `path`.
/// Refuses to overwrite an existing key file.
pub fn generate_key_file<P: AsRef<Path>>(path: P) -> Result<PayloadKey> {
    let path = path.as_ref();
    if path.exists() {
        return Err(LedgerError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "key file already exists"),
        ));
    }

    let key = PayloadKey::generate()?;
    store_key(&key, path)?;
    log::info!("Generated new payload key at {}", path.display());
    Ok(key)
}

/// Save key to file
pub fn store_key<P: AsRef<Path>>(key: &PayloadKey, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
    }

    let data = KeyFile {
        key: hex::encode(key.as_bytes()),
    };
    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| LedgerError::format(path, format!("Failed to serialize key file: {}", e)))?;

    fs::write(path, json).map_err(|e| LedgerError::io(path, e))
}

/// Load key from file
pub fn load_key<P: AsRef<Path>>(path: P) -> Result<PayloadKey> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;

    let data: KeyFile = serde_json::from_str(&json)
        .map_err(|e| LedgerError::format(path, format!("Failed to parse key file: {}", e)))?;
    let bytes = hex::decode(data.key.trim())
        .map_err(|e| LedgerError::format(path, format!("Invalid key hex: {}", e)))?;

    let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
        LedgerError::format(
            path,
            format!("Invalid key length: expected {}, got {}", KEY_SIZE, v.len()),
        )
    })?;
    Ok(PayloadKey::new(bytes))
}
