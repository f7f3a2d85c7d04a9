//! Version manager error types.

use thiserror::Error;

use strata_cache::CacheError;
use strata_common::types::{Uid, Xid};
use strata_common::StrataError;
use strata_storage::StorageError;
use strata_txn::TxnError;

/// Result type for version manager operations.
pub type MvccResult<T> = Result<T, MvccError>;

/// Errors that can occur in the version manager.
#[derive(Debug, Error)]
pub enum MvccError {
    /// Data manager failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Transaction file or lock table failure, including deadlocks.
    #[error(transparent)]
    Txn(#[from] TxnError),

    /// The transaction was aborted by the engine and can only be aborted
    /// by the caller now.
    #[error("transaction {xid} was aborted: {reason}")]
    TransactionAborted {
        /// The transaction.
        xid: Xid,
        /// Why it was aborted.
        reason: String,
    },

    /// The transaction is not active.
    #[error("transaction {xid} is not active")]
    UnknownTransaction {
        /// The transaction.
        xid: Xid,
    },

    /// A data item too short to be an entry.
    #[error("data item {uid:?} is not an entry ({len} bytes)")]
    NotAnEntry {
        /// The item.
        uid: Uid,
        /// Its payload length.
        len: usize,
    },
}

impl MvccError {
    /// Returns true if the error is a deadlock.
    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::Txn(TxnError::Deadlock { .. }))
    }

    /// Returns true if the engine must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_fatal(),
            Self::Txn(err) => err.is_fatal(),
            Self::NotAnEntry { .. } => true,
            _ => false,
        }
    }
}

impl From<CacheError> for MvccError {
    fn from(err: CacheError) -> Self {
        Self::Storage(err.into())
    }
}

impl From<MvccError> for StrataError {
    fn from(err: MvccError) -> Self {
        match err {
            MvccError::Storage(err) => err.into(),
            MvccError::Txn(err) => err.into(),
            MvccError::TransactionAborted { xid, reason } => {
                StrataError::TransactionAborted { xid, reason }
            }
            MvccError::UnknownTransaction { xid } => StrataError::TransactionNotFound { xid },
            MvccError::NotAnEntry { uid, len } => {
                StrataError::corruption(format!("data item {:?} is not an entry ({} bytes)", uid, len))
            }
        }
    }
}
