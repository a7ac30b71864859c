// Medical record ledger
// Encrypted patient records batched into proof-of-work chained blocks

pub mod core;
pub mod consensus;
pub mod chain;
pub mod storage;
pub mod access;
pub mod keystore;
pub mod config;
pub mod error;
pub mod cli;

// Re-exports for convenience
pub use core::{Block, EncryptedPayload, HexHash, NewRecord, PayloadKey, RecordData, Transaction};
pub use consensus::{Difficulty, IntegrityError, Miner, MiningResult};
pub use chain::Chain;
pub use storage::{BackupInfo, Storage};
pub use access::{AccessPolicy, Action, Role, StaticPolicy, User};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use cli::{Cli, CliHandler};
