// Block data structures

use crate::core::{sha256_hex, unix_now, HexHash, NewRecord, PayloadKey, Transaction, MAX_TRANSACTIONS};
use crate::error::{LedgerError, Result};

/// A batch of up to ten medical record transactions plus chaining metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Position in the chain, genesis is 0
    pub id: u32,
    /// Creation time (unix seconds)
    pub created_at: i64,
    /// Insertion order is chronological
    pub transactions: Vec<Transaction>,
    /// Hash of the previous block
    pub previous_hash: HexHash,
    /// Digest of this block as of the last recompute
    pub hash: HexHash,
    /// Proof-of-work counter
    pub nonce: u32,
}

impl Block {
    /// Create an empty block; `None` links it to the genesis sentinel
    pub fn new(id: u32, previous_hash: Option<HexHash>) -> Self {
        Self::with_timestamp(id, previous_hash, unix_now())
    }

    pub fn with_timestamp(id: u32, previous_hash: Option<HexHash>, created_at: i64) -> Self {
        Self {
            id,
            created_at,
            transactions: Vec::with_capacity(MAX_TRANSACTIONS),
            previous_hash: previous_hash.unwrap_or_else(HexHash::zero),
            hash: HexHash::empty(),
            nonce: 0,
        }
    }

    /// Canonical digest input: id, created_at, nonce, previous_hash, then
    /// patient_id, record_type and timestamp of every transaction.
    pub fn preimage(&self) -> String {
        let mut data = String::with_capacity(128 + self.transactions.len() * 80);
        data.push_str(&self.id.to_string());
        data.push_str(&self.created_at.to_string());
        data.push_str(&self.nonce.to_string());
        data.push_str(self.previous_hash.as_str());
        for tx in &self.transactions {
            tx.write_preimage(&mut data);
        }
        data
    }

    /// Digest of the current fields, without storing it
    pub fn compute_hash(&self) -> HexHash {
        sha256_hex(self.preimage().as_bytes())
    }

    /// Recompute and store the digest
    pub fn recompute_hash(&mut self) -> HexHash {
        self.hash = self.compute_hash();
        self.hash
    }

    /// True when the stored hash matches the current fields
    pub fn is_hash_current(&self) -> bool {
        self.compute_hash() == self.hash
    }

    pub fn is_full(&self) -> bool {
        self.transactions.len() >= MAX_TRANSACTIONS
    }

    pub fn is_genesis(&self) -> bool {
        self.id == 0 && self.previous_hash == HexHash::zero()
    }

    /// Admit a record: capacity check, validation, encryption, append, rehash.
    pub fn add_transaction(&mut self, record: NewRecord<'_>, key: &PayloadKey) -> Result<()> {
        if self.is_full() {
            return Err(LedgerError::Capacity {
                block_id: self.id,
                capacity: MAX_TRANSACTIONS,
            });
        }

        let tx = record.into_transaction(key)?;
        self.push_transaction(tx)
    }

    /// Append an already-built transaction (used by the codec and replays)
    pub fn push_transaction(&mut self, tx: Transaction) -> Result<()> {
        // re-checked here so a stale capacity check drops `tx` instead of growing
        if self.is_full() {
            return Err(LedgerError::Capacity {
                block_id: self.id,
                capacity: MAX_TRANSACTIONS,
            });
        }
        self.transactions.push(tx);
        self.recompute_hash();
        Ok(())
    }
}
