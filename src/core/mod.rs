// Core ledger data structures

mod types;
mod hash;
mod cipher;
mod transaction;
mod block;
pub mod serialize;

pub use types::*;
pub use hash::*;
pub use cipher::*;
pub use transaction::*;
pub use block::*;
