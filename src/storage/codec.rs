// Fixed-width binary layout for blocks, transactions and chain metadata
//
// Metadata record:    block_count u32 | difficulty i32
// Block record:       id u32 | created_at i64 | previous_hash [65] | hash [65]
//                     | nonce u32 | transaction_count i32 | transactions...
// Transaction record: patient_id [32] | record_type [32] | iv [16]
//                     | ciphertext_len u32 | ciphertext [256] | timestamp i64
//
// Hash slots hold 64 hex characters plus a NUL terminator. All integers are
// native byte order, so artifacts do not move between architectures.

use std::io::{self, Cursor, Read, Write};

use thiserror::Error;

use crate::consensus::Difficulty;
use crate::core::serialize::{
    read_fixed_str, read_i32, read_i64, read_slot, read_u32, write_fixed_str, write_i32,
    write_i64, write_slot, write_u32,
};
use crate::core::{
    Block, EncryptedPayload, HexHash, Transaction, HASH_HEX_SIZE, IV_SIZE, MAX_FIELD_LEN,
    MAX_TRANSACTIONS, PAYLOAD_SLOT_SIZE,
};

const FIELD_SLOT: usize = MAX_FIELD_LEN + 1;
const HASH_SLOT: usize = HASH_HEX_SIZE + 1;

/// Size of the metadata artifact
pub const METADATA_SIZE: usize = 4 + 4;

/// Size of a block record with no transactions
pub const BLOCK_HEADER_SIZE: usize = 4 + 8 + HASH_SLOT + HASH_SLOT + 4 + 4;

/// Size of one transaction record
pub const TRANSACTION_RECORD_SIZE: usize = FIELD_SLOT + FIELD_SLOT + IV_SIZE + 4 + PAYLOAD_SLOT_SIZE + 8;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{0}")]
    Format(String),
    #[error("{0}")]
    Allocation(String),
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::Format("unexpected end of data".to_string()),
            _ => CodecError::Format(err.to_string()),
        }
    }
}

/// Chain-level metadata stored next to the block data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub block_count: u32,
    pub difficulty: Difficulty,
}

pub fn encode_metadata(meta: &Metadata) -> Vec<u8> {
    let mut buf = Vec::with_capacity(METADATA_SIZE);
    buf.extend_from_slice(&meta.block_count.to_ne_bytes());
    buf.extend_from_slice(&(meta.difficulty.zeros() as i32).to_ne_bytes());
    buf
}

pub fn decode_metadata(data: &[u8]) -> Result<Metadata, CodecError> {
    if data.len() != METADATA_SIZE {
        return Err(CodecError::Format(format!(
            "metadata must be {} bytes, found {}",
            METADATA_SIZE,
            data.len()
        )));
    }

    let mut cursor = Cursor::new(data);
    let block_count = read_u32(&mut cursor)?;
    let raw_difficulty = read_i32(&mut cursor)?;

    if block_count == 0 {
        return Err(CodecError::Format("block count is zero".to_string()));
    }
    let difficulty = u32::try_from(raw_difficulty)
        .map_err(|_| format!("negative difficulty {}", raw_difficulty))
        .and_then(Difficulty::new)
        .map_err(CodecError::Format)?;

    Ok(Metadata {
        block_count,
        difficulty,
    })
}

fn write_hash<W: Write>(writer: &mut W, hash: &HexHash) -> io::Result<()> {
    write_slot(writer, hash.as_bytes(), HASH_SLOT)
}

fn read_hash<R: Read + ?Sized>(reader: &mut R) -> Result<HexHash, CodecError> {
    let slot = read_slot(reader, HASH_SLOT)?;
    if slot[HASH_HEX_SIZE] != 0 {
        return Err(CodecError::Format("hash slot is not NUL terminated".to_string()));
    }
    HexHash::from_bytes(&slot[..HASH_HEX_SIZE]).map_err(CodecError::Format)
}

/// Write one transaction record; a ciphertext larger than its slot is refused
pub fn write_transaction<W: Write>(writer: &mut W, tx: &Transaction) -> Result<(), CodecError> {
    if tx.payload.len() > PAYLOAD_SLOT_SIZE {
        return Err(CodecError::Format(format!(
            "payload of {} bytes for patient {} exceeds the {} byte slot",
            tx.payload.len(),
            tx.patient_id,
            PAYLOAD_SLOT_SIZE
        )));
    }

    write_fixed_str(writer, &tx.patient_id, FIELD_SLOT)?;
    write_fixed_str(writer, &tx.record_type, FIELD_SLOT)?;
    writer.write_all(&tx.payload.iv)?;
    write_u32(writer, tx.payload.len() as u32)?;
    write_slot(writer, &tx.payload.ciphertext, PAYLOAD_SLOT_SIZE)?;
    write_i64(writer, tx.timestamp)?;
    Ok(())
}

pub fn read_transaction<R: Read + ?Sized>(reader: &mut R) -> Result<Transaction, CodecError> {
    let patient_id = read_fixed_str(reader, FIELD_SLOT)?;
    let record_type = read_fixed_str(reader, FIELD_SLOT)?;

    let mut iv = [0u8; IV_SIZE];
    reader.read_exact(&mut iv)?;

    let len = read_u32(reader)? as usize;
    if len == 0 || len > PAYLOAD_SLOT_SIZE || len % IV_SIZE != 0 {
        return Err(CodecError::Format(format!("invalid ciphertext length {}", len)));
    }
    let mut ciphertext = read_slot(reader, PAYLOAD_SLOT_SIZE)?;
    ciphertext.truncate(len);

    let timestamp = read_i64(reader)?;

    Ok(Transaction {
        patient_id,
        record_type,
        payload: EncryptedPayload::new(iv, ciphertext),
        timestamp,
    })
}

pub fn write_block<W: Write>(writer: &mut W, block: &Block) -> Result<(), CodecError> {
    write_u32(writer, block.id)?;
    write_i64(writer, block.created_at)?;
    write_hash(writer, &block.previous_hash)?;
    write_hash(writer, &block.hash)?;
    write_u32(writer, block.nonce)?;
    write_i32(writer, block.transactions.len() as i32)?;
    for tx in &block.transactions {
        write_transaction(writer, tx)?;
    }
    Ok(())
}

/// Read one block record. The stored hash is taken as-is, not recomputed.
pub fn read_block<R: Read + ?Sized>(reader: &mut R) -> Result<Block, CodecError> {
    let id = read_u32(reader)?;
    let created_at = read_i64(reader)?;
    let previous_hash = read_hash(reader)?;
    let hash = read_hash(reader)?;
    let nonce = read_u32(reader)?;
    let tx_count = read_i32(reader)?;

    if tx_count < 0 || tx_count as usize > MAX_TRANSACTIONS {
        return Err(CodecError::Format(format!(
            "block {} declares {} transactions",
            id, tx_count
        )));
    }

    let mut transactions = Vec::with_capacity(MAX_TRANSACTIONS);
    for _ in 0..tx_count {
        transactions.push(read_transaction(reader)?);
    }

    Ok(Block {
        id,
        created_at,
        transactions,
        previous_hash,
        hash,
        nonce,
    })
}

/// Flatten blocks start-to-end
pub fn encode_blocks(blocks: &[Block]) -> Result<Vec<u8>, CodecError> {
    let size: usize = blocks
        .iter()
        .map(|b| BLOCK_HEADER_SIZE + b.transactions.len() * TRANSACTION_RECORD_SIZE)
        .sum();
    let mut buf = Vec::new();
    buf.try_reserve(size)
        .map_err(|e| CodecError::Allocation(e.to_string()))?;

    for block in blocks {
        write_block(&mut buf, block)?;
    }
    Ok(buf)
}

/// Replay exactly `count` block records; leftover bytes are an error
pub fn decode_blocks(data: &[u8], count: u32) -> Result<Vec<Block>, CodecError> {
    let count = count as usize;
    if count.saturating_mul(BLOCK_HEADER_SIZE) > data.len() {
        return Err(CodecError::Format(format!(
            "{} bytes cannot hold {} blocks",
            data.len(),
            count
        )));
    }

    let mut blocks = Vec::new();
    blocks
        .try_reserve(count)
        .map_err(|e| CodecError::Allocation(e.to_string()))?;

    let mut cursor = Cursor::new(data);
    for _ in 0..count {
        blocks.push(read_block(&mut cursor)?);
    }

    let consumed = cursor.position() as usize;
    if consumed != data.len() {
        return Err(CodecError::Format(format!(
            "{} trailing bytes after {} blocks",
            data.len() - consumed,
            count
        )));
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewRecord, PayloadKey, KEY_SIZE};

    fn key() -> PayloadKey {
        PayloadKey::new([3u8; KEY_SIZE])
    }

    fn sample_block() -> Block {
        let mut block = Block::with_timestamp(1, Some(HexHash::zero()), 1_650_000_000);
        block
            .add_transaction(NewRecord::plaintext("P1", "diagnosis", 1_650_000_001, b"bronchitis"), &key())
            .unwrap();
        block
            .add_transaction(NewRecord::plaintext("P2", "prescription", 1_650_000_002, b"amoxicillin"), &key())
            .unwrap();
        block.nonce = 99;
        block.recompute_hash();
        block
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(BLOCK_HEADER_SIZE, 150);
        assert_eq!(TRANSACTION_RECORD_SIZE, 348);

        let block = sample_block();
        let mut buf = Vec::new();
        write_block(&mut buf, &block).unwrap();
        assert_eq!(buf.len(), BLOCK_HEADER_SIZE + 2 * TRANSACTION_RECORD_SIZE);
    }

    #[test]
    fn test_block_record_layout() {
        let block = sample_block();
        let mut buf = Vec::new();
        write_block(&mut buf, &block).unwrap();

        assert_eq!(&buf[0..4], &1u32.to_ne_bytes());
        assert_eq!(&buf[4..12], &1_650_000_000i64.to_ne_bytes());
        assert_eq!(&buf[12..76], "0".repeat(64).as_bytes());
        assert_eq!(buf[76], 0);
        assert_eq!(&buf[77..141], block.hash.as_bytes());
        assert_eq!(&buf[142..146], &99u32.to_ne_bytes());
        assert_eq!(&buf[146..150], &2i32.to_ne_bytes());
        assert_eq!(&buf[150..153], b"P1\0");
    }

    #[test]
    fn test_block_survives_decode() {
        let block = sample_block();
        let mut buf = Vec::new();
        write_block(&mut buf, &block).unwrap();

        let decoded = read_block(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(decoded, block);
        assert!(decoded.is_hash_current());
        assert_eq!(decoded.transactions[1].decrypt(&key()).unwrap(), b"amoxicillin");
    }

    #[test]
    fn test_metadata() {
        let meta = Metadata {
            block_count: 3,
            difficulty: Difficulty::new(4).unwrap(),
        };
        let bytes = encode_metadata(&meta);
        assert_eq!(bytes.len(), METADATA_SIZE);
        assert_eq!(decode_metadata(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_bad_metadata() {
        assert!(decode_metadata(&[0u8; 3]).is_err());

        let mut zero_blocks = Vec::new();
        zero_blocks.extend_from_slice(&0u32.to_ne_bytes());
        zero_blocks.extend_from_slice(&4i32.to_ne_bytes());
        assert!(decode_metadata(&zero_blocks).is_err());

        let mut bad_difficulty = Vec::new();
        bad_difficulty.extend_from_slice(&1u32.to_ne_bytes());
        bad_difficulty.extend_from_slice(&(-1i32).to_ne_bytes());
        assert!(decode_metadata(&bad_difficulty).is_err());
    }

    #[test]
    fn test_truncated_blocks() {
        let blocks = vec![sample_block()];
        let buf = encode_blocks(&blocks).unwrap();
        let err = decode_blocks(&buf[..buf.len() - 10], 1).unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = encode_blocks(&[sample_block()]).unwrap();
        buf.push(0);
        assert!(matches!(decode_blocks(&buf, 1), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_count_larger_than_data() {
        let buf = encode_blocks(&[sample_block()]).unwrap();
        assert!(matches!(decode_blocks(&buf, u32::MAX), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_too_many_transactions_rejected() {
        let mut buf = Vec::new();
        write_block(&mut buf, &sample_block()).unwrap();
        buf[146..150].copy_from_slice(&11i32.to_ne_bytes());
        assert!(matches!(read_block(&mut Cursor::new(&buf)), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_corrupt_hash_rejected() {
        let mut buf = Vec::new();
        write_block(&mut buf, &sample_block()).unwrap();
        buf[20] = b'Z';
        assert!(matches!(read_block(&mut Cursor::new(&buf)), Err(CodecError::Format(_))));
    }

    #[test]
    fn test_oversize_payload_refused() {
        let mut block = sample_block();
        block.transactions[0].payload.ciphertext = vec![0u8; PAYLOAD_SLOT_SIZE + 16];
        let mut buf = Vec::new();
        assert!(matches!(write_block(&mut buf, &block), Err(CodecError::Format(_))));
    }
}
