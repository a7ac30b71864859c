// Payload cipher: AES-256-CBC with PKCS#7 padding

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::core::{IV_SIZE, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;

/// Cipher failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// Padding check failed: wrong key or corrupted ciphertext
    #[error("decryption failed: wrong key or corrupted ciphertext")]
    BadPadding,
    /// Payload cannot be a CBC ciphertext
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// OS random number generator failed
    #[error("random number generator failure: {0}")]
    Rng(String),
}

/// 256-bit payload key, supplied by the caller on every call
#[derive(Clone, PartialEq, Eq)]
pub struct PayloadKey([u8; KEY_SIZE]);

impl PayloadKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generate a new key from the OS random number generator
    pub fn generate() -> Result<Self, CipherError> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CipherError::Rng(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for PayloadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "PayloadKey(..)")
    }
}

/// Encrypted form of one transaction's record data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Fresh per encryption
    pub iv: [u8; IV_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    pub fn new(iv: [u8; IV_SIZE], ciphertext: Vec<u8>) -> Self {
        Self { iv, ciphertext }
    }

    /// Ciphertext length in bytes
    pub fn len(&self) -> usize {
        self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Structural check: non-empty and block aligned
    pub fn check_shape(&self) -> Result<(), CipherError> {
        if self.ciphertext.is_empty() {
            return Err(CipherError::Malformed("empty ciphertext".to_string()));
        }
        if self.ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::Malformed(format!(
                "ciphertext length {} is not a multiple of {}",
                self.ciphertext.len(),
                BLOCK_SIZE
            )));
        }
        Ok(())
    }
}

/// Encrypt `plaintext` under `key` with a fresh random IV
pub fn encrypt(plaintext: &[u8], key: &PayloadKey) -> Result<EncryptedPayload, CipherError> {
    let mut iv = [0u8; IV_SIZE];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CipherError::Rng(e.to_string()))?;

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CipherError::Malformed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Ok(EncryptedPayload { iv, ciphertext })
}

/// Reverse `encrypt`; a wrong key shows up as a padding failure
pub fn decrypt(payload: &EncryptedPayload, key: &PayloadKey) -> Result<Vec<u8>, CipherError> {
    payload.check_shape()?;

    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), &payload.iv)
        .map_err(|e| CipherError::Malformed(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&payload.ciphertext)
        .map_err(|_| CipherError::BadPadding)
}
