// Proof of Work implementation

use crate::core::{unix_now, Block, HexHash, HASH_HEX_SIZE};
use std::time::{Duration, Instant};

/// Required count of leading '0' hex characters in a block digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Difficulty(u32);

impl Difficulty {
    /// Default used by new chains
    pub const DEFAULT: Difficulty = Difficulty(4);

    pub fn new(zeros: u32) -> Result<Self, String> {
        if zeros as usize > HASH_HEX_SIZE {
            return Err(format!(
                "difficulty {} exceeds the {} hex characters of a digest",
                zeros, HASH_HEX_SIZE
            ));
        }
        Ok(Self(zeros))
    }

    pub fn zeros(&self) -> u32 {
        self.0
    }

    /// Check if a hash meets this difficulty
    pub fn is_satisfied_by(&self, hash: &HexHash) -> bool {
        !hash.is_empty() && hash.leading_zeros() >= self.0 as usize
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proof of Work miner
pub struct Miner {
    pub difficulty: Difficulty,
}

impl Miner {
    pub fn new(difficulty: Difficulty) -> Self {
        Self { difficulty }
    }

    /// Mine a block in place by searching nonces from its current value.
    ///
    /// Links the block to `previous_hash` first. Blocks until a solution is
    /// found. When the whole u32 nonce space is exhausted the creation
    /// timestamp is refreshed and the search continues.
    pub fn mine(&self, block: &mut Block, previous_hash: HexHash) -> MiningResult {
        let start_time = Instant::now();
        let mut attempts = 0u64;
        let start_nonce = block.nonce;

        block.previous_hash = previous_hash;

        loop {
            let hash = block.recompute_hash();
            attempts += 1;

            if self.difficulty.is_satisfied_by(&hash) {
                let result = MiningResult {
                    nonce: block.nonce,
                    hash,
                    attempts,
                    duration: start_time.elapsed(),
                };
                log::info!(
                    "Mined block {} at difficulty {}: nonce {} after {} attempts ({:.1} KH/s)",
                    block.id,
                    self.difficulty,
                    result.nonce,
                    result.attempts,
                    result.hash_rate() / 1000.0
                );
                return result;
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining block {}: {} attempts ({:.1} KH/s)",
                    block.id,
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            block.nonce = block.nonce.wrapping_add(1);
            if block.nonce == start_nonce {
                log::warn!(
                    "Nonce space exhausted for block {}; refreshing timestamp",
                    block.id
                );
                block.created_at = unix_now().max(block.created_at + 1);
            }
        }
    }

    /// Verify that a block's stored hash satisfies the difficulty
    pub fn verify(&self, block: &Block) -> bool {
        self.difficulty.is_satisfied_by(&block.hash)
    }
}

/// Mining result
#[derive(Debug, Clone)]
pub struct MiningResult {
    /// The nonce that was found
    pub nonce: u32,
    /// The resulting hash
    pub hash: HexHash,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            return self.attempts as f64;
        }
        self.attempts as f64 / secs
    }
}
