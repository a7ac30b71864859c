// Medical record transactions

use crate::core::{encrypt, EncryptedPayload, PayloadKey, MAX_FIELD_LEN, MAX_RECORD_LEN, PAYLOAD_SLOT_SIZE};
use crate::error::{LedgerError, Result};

/// One medical record entry inside a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Patient identifier (1..=31 bytes)
    pub patient_id: String,
    /// Record kind, e.g. "diagnosis", "prescription", "vitals"
    pub record_type: String,
    /// Encrypted record data
    pub payload: EncryptedPayload,
    /// Unix seconds
    pub timestamp: i64,
}

/// Record data as handed to admission
#[derive(Debug, Clone)]
pub enum RecordData<'a> {
    /// Encrypted under the caller's key on admission
    Plaintext(&'a [u8]),
    /// Copied verbatim (replay and migration paths)
    Encrypted(EncryptedPayload),
}

/// A transaction that has not been admitted to a block yet
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub patient_id: &'a str,
    pub record_type: &'a str,
    pub timestamp: i64,
    pub data: RecordData<'a>,
}

impl<'a> NewRecord<'a> {
    pub fn plaintext(patient_id: &'a str, record_type: &'a str, timestamp: i64, data: &'a [u8]) -> Self {
        Self {
            patient_id,
            record_type,
            timestamp,
            data: RecordData::Plaintext(data),
        }
    }

    pub fn encrypted(
        patient_id: &'a str,
        record_type: &'a str,
        timestamp: i64,
        payload: EncryptedPayload,
    ) -> Self {
        Self {
            patient_id,
            record_type,
            timestamp,
            data: RecordData::Encrypted(payload),
        }
    }

    /// Check every field without touching the cipher
    pub fn validate(&self) -> Result<()> {
        validate_field("patient_id", self.patient_id)?;
        validate_field("record_type", self.record_type)?;

        if self.timestamp < 0 {
            return Err(LedgerError::validation(
                "timestamp",
                format!("{} is before the unix epoch", self.timestamp),
            ));
        }

        match &self.data {
            RecordData::Plaintext(data) => {
                if data.is_empty() {
                    return Err(LedgerError::validation("record data", "must not be empty"));
                }
                if data.len() > MAX_RECORD_LEN {
                    return Err(LedgerError::validation(
                        "record data",
                        format!("{} bytes exceeds {}", data.len(), MAX_RECORD_LEN),
                    ));
                }
            }
            RecordData::Encrypted(payload) => {
                payload
                    .check_shape()
                    .map_err(|e| LedgerError::validation("payload", e.to_string()))?;
                if payload.len() > PAYLOAD_SLOT_SIZE {
                    return Err(LedgerError::validation(
                        "payload",
                        format!("{} ciphertext bytes exceeds the {} byte slot", payload.len(), PAYLOAD_SLOT_SIZE),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Validate, then encrypt (or copy) into an owned transaction
    pub fn into_transaction(self, key: &PayloadKey) -> Result<Transaction> {
        self.validate()?;
        let payload = match self.data {
            RecordData::Plaintext(data) => encrypt(data, key)?,
            RecordData::Encrypted(payload) => payload,
        };
        Ok(Transaction {
            patient_id: self.patient_id.to_string(),
            record_type: self.record_type.to_string(),
            payload,
            timestamp: self.timestamp,
        })
    }
}

/// Patient ids and record types share the same bounds
pub fn validate_field(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(LedgerError::validation(field, "must not be empty"));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(LedgerError::validation(
            field,
            format!("{} bytes exceeds {}", value.len(), MAX_FIELD_LEN),
        ));
    }
    if value.contains('\0') {
        return Err(LedgerError::validation(field, "must not contain NUL bytes"));
    }
    Ok(())
}

impl Transaction {
    /// Decrypt the record data with the caller's key
    pub fn decrypt(&self, key: &PayloadKey) -> Result<Vec<u8>> {
        Ok(crate::core::decrypt(&self.payload, key)?)
    }

    /// Append this transaction's digest contribution; payload bytes are not included
    pub fn write_preimage(&self, out: &mut String) {
        out.push_str(&self.patient_id);
        out.push_str(&self.record_type);
        out.push_str(&self.timestamp.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CipherError, KEY_SIZE};

    fn key() -> PayloadKey {
        PayloadKey::new([9u8; KEY_SIZE])
    }

    #[test]
    fn test_plaintext_record_is_encrypted() {
        let tx = NewRecord::plaintext("P1", "diagnosis", 1_700_000_000, b"asthma")
            .into_transaction(&key())
            .unwrap();
        assert_eq!(tx.patient_id, "P1");
        assert_ne!(tx.payload.ciphertext, b"asthma");
        assert_eq!(tx.decrypt(&key()).unwrap(), b"asthma");
    }

    #[test]
    fn test_encrypted_record_copied_verbatim() {
        let payload = encrypt(b"penicillin 500mg", &key()).unwrap();
        let tx = NewRecord::encrypted("P2", "prescription", 1, payload.clone())
            .into_transaction(&key())
            .unwrap();
        assert_eq!(tx.payload, payload);
    }

    #[test]
    fn test_field_bounds() {
        assert!(validate_field("patient_id", "").is_err());
        assert!(validate_field("patient_id", &"a".repeat(31)).is_ok());
        assert!(validate_field("patient_id", &"a".repeat(32)).is_err());
        assert!(validate_field("patient_id", "P\01").is_err());
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let err = NewRecord::plaintext("P1", "visit", -5, b"x").validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "timestamp", .. }));
    }

    #[test]
    fn test_record_length_bounds() {
        let long = vec![b'a'; MAX_RECORD_LEN + 1];
        assert!(NewRecord::plaintext("P1", "visit", 0, &long).validate().is_err());
        assert!(NewRecord::plaintext("P1", "visit", 0, b"").validate().is_err());
        let max = vec![b'a'; MAX_RECORD_LEN];
        let tx = NewRecord::plaintext("P1", "visit", 0, &max).into_transaction(&key()).unwrap();
        assert!(tx.payload.len() <= PAYLOAD_SLOT_SIZE);
    }

    #[test]
    fn test_oversize_encrypted_payload_rejected() {
        let payload = EncryptedPayload::new([0u8; 16], vec![0u8; PAYLOAD_SLOT_SIZE + 16]);
        let err = NewRecord::encrypted("P1", "visit", 0, payload).validate().unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: "payload", .. }));
    }

    #[test]
    fn test_decrypt_with_wrong_key() {
        let tx = NewRecord::plaintext("P1", "diagnosis", 0, b"migraine with aura")
            .into_transaction(&key())
            .unwrap();
        let other = PayloadKey::new([1u8; KEY_SIZE]);
        match tx.decrypt(&other) {
            Err(LedgerError::Cipher(CipherError::BadPadding)) => {}
            Ok(bytes) => assert_ne!(bytes, b"migraine with aura"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_preimage_excludes_payload() {
        let a = NewRecord::plaintext("P1", "visit", 42, b"one").into_transaction(&key()).unwrap();
        let b = NewRecord::plaintext("P1", "visit", 42, b"two").into_transaction(&key()).unwrap();
        let (mut pa, mut pb) = (String::new(), String::new());
        a.write_preimage(&mut pa);
        b.write_preimage(&mut pb);
        assert_eq!(pa, "P1visit42");
        assert_eq!(pa, pb);
    }
}
