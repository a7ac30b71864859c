// Consensus: proof of work and chain validation

pub mod pow;
pub mod validation;

pub use pow::{Difficulty, Miner, MiningResult};
pub use validation::{validate_block, validate_chain, validate_link, IntegrityError};
