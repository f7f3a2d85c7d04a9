//! Transaction error types.

use std::io;
use thiserror::Error;

use strata_common::types::{Uid, Xid};
use strata_common::StrataError;

/// Result type for transaction operations.
pub type TxnResult<T> = Result<T, TxnError>;

/// Errors raised by the status file and the lock table.
#[derive(Debug, Error)]
pub enum TxnError {
    /// I/O error on the status file.
    #[error("transaction file I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// The status file is inconsistent. The engine must not start.
    #[error("bad transaction file: {reason}")]
    BadXidFile {
        /// Description of the inconsistency.
        reason: String,
    },

    /// The id was never allocated.
    #[error("transaction {xid} was never allocated")]
    UnknownXid {
        /// The id.
        xid: Xid,
    },

    /// Waiting for the record would close a cycle.
    #[error("deadlock: transaction {xid} waiting for {uid:?}")]
    Deadlock {
        /// The requesting transaction, which must abort.
        xid: Xid,
        /// The record it asked for.
        uid: Uid,
    },
}

impl TxnError {
    /// Creates a bad transaction file error.
    pub fn bad_xid_file(reason: impl Into<String>) -> Self {
        Self::BadXidFile {
            reason: reason.into(),
        }
    }

    /// Returns true if the engine must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::BadXidFile { .. })
    }
}

impl From<TxnError> for StrataError {
    fn from(err: TxnError) -> Self {
        match err {
            TxnError::Io { source } => StrataError::Io { source },
            TxnError::BadXidFile { reason } => StrataError::Corruption { message: reason },
            TxnError::UnknownXid { xid } => StrataError::TransactionNotFound { xid },
            TxnError::Deadlock { xid, .. } => StrataError::Deadlock { xid },
        }
    }
}
