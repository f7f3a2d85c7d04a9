//! Storage error types.

use std::io;

use thiserror::Error;

use strata_cache::CacheError;
use strata_common::types::{PageNo, Uid};
use strata_common::StrataError;
use strata_txn::TxnError;
use strata_wal::WalError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the data manager.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error on the page file.
    #[error("page file I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: io::Error,
    },

    /// Log failure.
    #[error(transparent)]
    Wal(#[from] WalError),

    /// Transaction status file failure.
    #[error(transparent)]
    Txn(#[from] TxnError),

    /// A cache refused to load another resource.
    #[error("cache is full ({capacity} resident entries)")]
    CacheFull {
        /// Configured capacity.
        capacity: usize,
    },

    /// The cache memory budget is below the minimum.
    #[error("page cache holds {pages} pages, at least {min} required")]
    CacheTooSmall {
        /// Pages the budget allows.
        pages: usize,
        /// Minimum page count.
        min: usize,
    },

    /// The item is missing or has been invalidated.
    #[error("data item {uid:?} not found")]
    DataNotFound {
        /// Address of the item.
        uid: Uid,
    },

    /// Record does not fit in a page.
    #[error("data item of {size} bytes exceeds page capacity {max_size}")]
    DataTooLarge {
        /// Wrapped size of the item.
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

    /// A page number beyond the end of the page file.
    #[error("page {page_no} out of range, file has {page_count} pages")]
    PageOutOfRange {
        /// The page.
        page_no: PageNo,
        /// Pages in the file.
        page_count: u32,
    },

    /// A page holds bytes that cannot be interpreted.
    #[error("page {page_no} corrupted: {reason}")]
    CorruptPage {
        /// The page.
        page_no: PageNo,
        /// What was wrong.
        reason: String,
    },
}

impl StorageError {
    /// Creates a corrupt page error.
    pub fn corrupt_page(page_no: PageNo, reason: impl Into<String>) -> Self {
        Self::CorruptPage {
            page_no,
            reason: reason.into(),
        }
    }

    /// Returns true if the operation may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CacheFull { .. } | Self::DatabaseBusy { .. })
    }

    /// Returns true if the engine must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io { .. }
            | Self::Wal(_)
            | Self::PageOutOfRange { .. }
            | Self::CorruptPage { .. } => true,
            Self::Txn(err) => err.is_fatal(),
            _ => false,
        }
    }
}

impl From<CacheError> for StorageError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::CacheFull { capacity } => Self::CacheFull { capacity },
        }
    }
}

impl From<StorageError> for StrataError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io { source } => StrataError::Io { source },
            StorageError::Wal(err) => err.into(),
            StorageError::Txn(err) => err.into(),
            StorageError::CacheFull { capacity } => StrataError::CacheFull { capacity },
            StorageError::CacheTooSmall { pages, min } => StrataError::invalid_config(format!(
                "page cache holds {} pages, at least {} required",
                pages, min
            )),
            StorageError::DataNotFound { uid } => StrataError::DataNotFound { uid },
            StorageError::DataTooLarge { size, max_size } => {
                StrataError::DataTooLarge { size, max_size }
            }
            StorageError::DatabaseBusy { size } => StrataError::DatabaseBusy { size },
            StorageError::PageOutOfRange { page_no, .. } => StrataError::PageOutOfRange { page_no },
            StorageError::CorruptPage { page_no, reason } => {
                StrataError::corruption(format!("page {}: {}", page_no, reason))
            }
        }
    }
}
