//! WAL error types.

use std::io;
use thiserror::Error;

use strata_common::StrataError;

/// Result type for WAL operations.
pub type WalResult<T> = Result<T, WalError>;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// I/O error during WAL operations.
    #[error("WAL I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The log cannot be repaired. The engine must not start.
    #[error("WAL corrupted: {reason}")]
    Corrupted {
        /// Description of the failure.
        reason: String,
    },

    /// A record payload could not be decoded.
    #[error("malformed log record: {reason}")]
    MalformedRecord {
        /// Description of the failure.
        reason: String,
    },
}

impl WalError {
    /// Creates a corrupted log error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    /// Creates a malformed record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    /// Every WAL error is fatal to the engine.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl From<WalError> for StrataError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Io { source } => StrataError::Io { source },
            WalError::Corrupted { reason } | WalError::MalformedRecord { reason } => {
                StrataError::WalCorrupted { reason }
            }
        }
    }
}
