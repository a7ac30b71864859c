// The in-process ledger: an arena of mined blocks plus one pending tail block

use crate::access::{AccessPolicy, Action, Role};
use crate::consensus::{validate_chain, Difficulty, IntegrityError, Miner, MiningResult};
use crate::core::{Block, HexHash, NewRecord, PayloadKey};
use crate::error::{LedgerError, Result};

/// Forward-only chain of blocks anchored at a genesis block.
///
/// `blocks[0]` is genesis and `blocks[i].id == i`. New transactions land in
/// the pending block, which becomes `blocks[block_count]` once mined.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    pending: Block,
    difficulty: Difficulty,
}

impl Chain {
    /// Create a chain and mine its genesis block
    pub fn new(difficulty: Difficulty) -> Self {
        let mut genesis = Block::new(0, None);
        Miner::new(difficulty).mine(&mut genesis, HexHash::zero());
        log::info!("Genesis block mined: {}", genesis.hash);

        let pending = Block::new(1, Some(genesis.hash));
        Self {
            blocks: vec![genesis],
            pending,
            difficulty,
        }
    }

    /// Rebuild a chain from already-linked blocks without re-verifying them
    pub fn from_parts(blocks: Vec<Block>, difficulty: Difficulty, pending: Option<Block>) -> Result<Self> {
        let tail = blocks.last().ok_or_else(|| {
            LedgerError::validation("chain", "a chain needs at least a genesis block")
        })?;
        let next_id = next_id(blocks.len())?;

        let pending = match pending {
            Some(block) if block.id == next_id && block.previous_hash == tail.hash => block,
            Some(block) => {
                log::warn!(
                    "Discarding pending block {} that does not extend tail {}",
                    block.id,
                    tail.id
                );
                Block::new(next_id, Some(tail.hash))
            }
            None => Block::new(next_id, Some(tail.hash)),
        };

        Ok(Self {
            blocks,
            pending,
            difficulty,
        })
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Number of appended blocks, genesis included
    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Last appended block
    pub fn tail(&self) -> &Block {
        // never empty: constructors require a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_block(&self, id: u32) -> Option<&Block> {
        self.blocks.get(id as usize)
    }

    /// Direct mutable access to an appended block (repairs and tamper tests)
    pub fn get_block_mut(&mut self, id: u32) -> Option<&mut Block> {
        self.blocks.get_mut(id as usize)
    }

    /// Block currently accumulating transactions
    pub fn pending(&self) -> &Block {
        &self.pending
    }

    /// Total transactions across appended blocks
    pub fn transaction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.transactions.len()).sum()
    }

    /// Admit a record into the pending block
    pub fn add_transaction(&mut self, record: NewRecord<'_>, key: &PayloadKey) -> Result<()> {
        self.pending.add_transaction(record, key)?;
        log::debug!(
            "Pending block {} now holds {} transactions",
            self.pending.id,
            self.pending.transactions.len()
        );
        Ok(())
    }

    /// Admit a record after the access policy allows `role` to write its record type
    pub fn add_transaction_as<P: AccessPolicy>(
        &mut self,
        policy: &P,
        role: Role,
        record: NewRecord<'_>,
        key: &PayloadKey,
    ) -> Result<()> {
        policy.authorize(role, record.record_type, Action::Write)?;
        self.add_transaction(record, key)
    }

    /// Mine `block` against the current tail. Does not append it.
    pub fn mine(&self, block: &mut Block) -> MiningResult {
        Miner::new(self.difficulty).mine(block, self.tail().hash)
    }

    /// Link a mined block after the tail. All-or-nothing.
    pub fn append(&mut self, block: Block) -> Result<()> {
        let (tail_id, tail_hash) = (self.tail().id, self.tail().hash);

        if block.previous_hash != tail_hash {
            return Err(LedgerError::Linkage {
                block_id: block.id,
                reason: format!(
                    "previous hash {} does not match tail {} hash {}",
                    block.previous_hash, tail_id, tail_hash
                ),
            });
        }

        let expected_id = next_id(self.blocks.len())?;
        if block.id != expected_id {
            return Err(LedgerError::Linkage {
                block_id: block.id,
                reason: format!("expected block id {}", expected_id),
            });
        }

        if !block.is_hash_current() {
            return Err(LedgerError::Linkage {
                block_id: block.id,
                reason: "stored hash does not match block contents".to_string(),
            });
        }

        self.blocks
            .try_reserve(1)
            .map_err(|e| LedgerError::Allocation(e.to_string()))?;
        log::info!("Appended block {} ({} transactions)", block.id, block.transactions.len());
        self.blocks.push(block);
        Ok(())
    }

    /// Mine the pending block, append it and start a fresh pending block
    pub fn mine_pending(&mut self) -> Result<MiningResult> {
        if self.pending.transactions.is_empty() {
            return Err(LedgerError::validation("pending block", "no transactions to mine"));
        }

        let mut block = self.pending.clone();
        let result = self.mine(&mut block);
        self.append(block)?;

        let tail_hash = self.tail().hash;
        self.pending = Block::new(next_id(self.blocks.len())?, Some(tail_hash));
        Ok(result)
    }

    /// Replace the whole chain with `other` (used by restore)
    pub fn replace_with(&mut self, other: Chain) {
        *self = other;
    }

    /// Walk the chain and report the first integrity failure
    pub fn audit(&self) -> std::result::Result<(), IntegrityError> {
        validate_chain(&self.blocks)
    }

    /// True when every digest and every link holds
    pub fn verify(&self) -> bool {
        match self.audit() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Chain verification failed: {}", e);
                false
            }
        }
    }
}

fn next_id(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| LedgerError::Allocation("block id space exhausted".to_string()))
}
