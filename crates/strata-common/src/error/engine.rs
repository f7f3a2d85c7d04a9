//! Engine error types.

use std::fmt;
use thiserror::Error;

use crate::types::{PageNo, Uid, Xid};

/// Error codes for categorizing errors.
///
/// The high byte is the category, the low byte the specific condition.
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Data corruption detected.
    Corruption = 0x0104,

    // Storage errors (0x0200 - 0x02FF)
    /// A reference-counted cache is at capacity.
    CacheFull = 0x0202,
    /// The addressed data item does not exist or was deleted.
    DataNotFound = 0x0203,
    /// Record does not fit in a page.
    DataTooLarge = 0x0206,
    /// No page with free space could be obtained.
    DatabaseBusy = 0x0207,

    // Transaction errors (0x0300 - 0x03FF)
    /// Transaction was aborted.
    TransactionAborted = 0x0300,
    /// Deadlock detected.
    Deadlock = 0x0302,
    /// Transaction not found.
    TransactionNotFound = 0x0304,

    // WAL errors (0x0400 - 0x04FF)
    /// Log is corrupted.
    WalCorrupted = 0x0400,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Storage",
            0x03 => "Transaction",
            0x04 => "WAL",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The unified error type for Strata.
///
/// Logical outcomes (`CacheFull`, `DataNotFound`, `Deadlock`) are ordinary
/// conditions the caller branches on. Everything reported by
/// [`StrataError::is_fatal`] means the engine cannot safely continue.
///
/// # Example
///
/// ```rust
/// use strata_common::error::{StrataError, StrataResult};
/// use strata_common::types::Uid;
///
/// fn lookup(uid: Uid) -> StrataResult<Vec<u8>> {
///     Err(StrataError::DataNotFound { uid })
/// }
///
/// let err = lookup(Uid::new(42)).unwrap_err();
/// assert!(!err.is_fatal());
/// ```
#[derive(Debug, Error)]
pub enum StrataError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Data corruption detected.
    #[error("data corruption detected: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    // ==========================================================================
    // Storage Errors
    // ==========================================================================
    /// A cache refused to load another resource.
    #[error("cache is full ({capacity} resident entries)")]
    CacheFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The data item is missing or has been invalidated.
    #[error("data item {uid:?} not found")]
    DataNotFound {
        /// Address of the item.
        uid: Uid,
    },

    /// A page number points past the end of the page file.
    #[error("page {page_no} is out of range")]
    PageOutOfRange {
        /// The offending page.
        page_no: PageNo,
    },

    /// Record does not fit in a page.
    #[error("data size {size} exceeds page capacity {max_size}")]
    DataTooLarge {
        /// Wrapped record size.
        size: usize,
        /// Largest size a page accepts.
        max_size: usize,
    },

    /// No page with enough free space could be found or allocated.
    #[error("database busy: no page available for {size} bytes")]
    DatabaseBusy {
        /// Requested size.
        size: usize,
    },

    // ==========================================================================
    // Transaction Errors
    // ==========================================================================
    /// Transaction was aborted and can no longer be used.
    #[error("transaction {xid} aborted: {reason}")]
    TransactionAborted {
        /// Transaction ID.
        xid: Xid,
        /// Reason for abort.
        reason: String,
    },

    /// Deadlock detected, the requesting transaction must abort.
    #[error("deadlock detected, transaction {xid} was chosen as victim")]
    Deadlock {
        /// The victim.
        xid: Xid,
    },

    /// Transaction not found.
    #[error("transaction {xid} not found")]
    TransactionNotFound {
        /// Transaction ID.
        xid: Xid,
    },

    // ==========================================================================
    // WAL Errors
    // ==========================================================================
    /// The log cannot be repaired.
    #[error("log corrupted: {reason}")]
    WalCorrupted {
        /// Description of the failure.
        reason: String,
    },
}

impl StrataError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::InvalidArgument { .. } | Self::InvalidConfig { .. } => {
                ErrorCode::InvalidArgument
            }
            Self::Io { .. } => ErrorCode::Io,
            Self::Corruption { .. } => ErrorCode::Corruption,
            Self::CacheFull { .. } => ErrorCode::CacheFull,
            Self::DataNotFound { .. } => ErrorCode::DataNotFound,
            Self::PageOutOfRange { .. } => ErrorCode::Corruption,
            Self::DataTooLarge { .. } => ErrorCode::DataTooLarge,
            Self::DatabaseBusy { .. } => ErrorCode::DatabaseBusy,
            Self::TransactionAborted { .. } => ErrorCode::TransactionAborted,
            Self::Deadlock { .. } => ErrorCode::Deadlock,
            Self::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
            Self::WalCorrupted { .. } => ErrorCode::WalCorrupted,
        }
    }

    /// Returns true if the operation may succeed when retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CacheFull { .. } | Self::DatabaseBusy { .. })
    }

    /// Returns true if this error is a concurrency conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Deadlock { .. } | Self::TransactionAborted { .. })
    }

    /// Returns true if the engine must stop.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::Corruption { .. }
                | Self::PageOutOfRange { .. }
                | Self::WalCorrupted { .. }
                | Self::Internal { .. }
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
