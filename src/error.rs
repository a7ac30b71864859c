// Error taxonomy for the ledger

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::CipherError;

/// Every failure a ledger operation can report to its caller
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Resource exhaustion while building a block, chain or payload
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// Malformed patient id, record type, timestamp or payload
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Block already holds its full set of transactions
    #[error("block {block_id} already holds {capacity} transactions")]
    Capacity { block_id: u32, capacity: usize },

    #[error(transparent)]
    Cipher(#[from] CipherError),

    /// Block does not extend the current tail
    #[error("block {block_id} cannot be appended: {reason}")]
    Linkage { block_id: u32, reason: String },

    /// Artifact missing or unwritable
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Artifact present but malformed or truncated
    #[error("malformed artifact {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("access denied: {role} may not {action} {resource}")]
    AccessDenied {
        role: String,
        action: String,
        resource: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        LedgerError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the error means "artifact does not exist"
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
