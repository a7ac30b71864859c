// Chain integrity validation

use crate::core::{Block, HexHash};
use thiserror::Error;

/// First integrity failure found while walking a chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    /// Chain holds no blocks
    #[error("chain has no genesis block")]
    Empty,
    /// Stored hash does not match the block's current fields
    #[error("block {id}: stored hash {stored} does not match recomputed {computed}")]
    StaleHash {
        id: u32,
        stored: HexHash,
        computed: HexHash,
    },
    /// previous_hash does not match the predecessor's hash
    #[error("block {id}: previous hash {found} does not match block {prev_id} hash {expected}")]
    BrokenLink {
        id: u32,
        prev_id: u32,
        expected: HexHash,
        found: HexHash,
    },
}

/// Check one block's stored hash against its fields
pub fn validate_block(block: &Block) -> Result<(), IntegrityError> {
    let computed = block.compute_hash();
    if computed != block.hash {
        return Err(IntegrityError::StaleHash {
            id: block.id,
            stored: block.hash,
            computed,
        });
    }
    Ok(())
}

/// Check that `next` links to `prev`
pub fn validate_link(prev: &Block, next: &Block) -> Result<(), IntegrityError> {
    if next.previous_hash != prev.hash {
        return Err(IntegrityError::BrokenLink {
            id: next.id,
            prev_id: prev.id,
            expected: prev.hash,
            found: next.previous_hash,
        });
    }
    Ok(())
}

/// Walk genesis to tail: every digest must match and every link must hold.
/// Stops at the first failure.
pub fn validate_chain(blocks: &[Block]) -> Result<(), IntegrityError> {
    if blocks.is_empty() {
        return Err(IntegrityError::Empty);
    }

    for (i, block) in blocks.iter().enumerate() {
        validate_block(block)?;
        if let Some(next) = blocks.get(i + 1) {
            validate_link(block, next)?;
        }
    }
    Ok(())
}
