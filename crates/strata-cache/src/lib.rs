//! Reference-counted resource caching for Strata.
//!
//! The engine keeps two kinds of shared resources in memory: pages and the
//! data items that live inside them. Both follow the same policy, so the
//! bookkeeping lives here once and is parameterized over a [`CacheSource`]
//! that knows how to load and write back one resource.
//!
//! - **Pinning**: every `get` pins the resource; `release` unpins it and the
//!   last release evicts it through [`CacheSource::evict`].
//! - **Single fetch**: concurrent `get`s of a key that is being loaded block
//!   on a condition variable instead of issuing a second fetch.
//! - **Bounded**: when `capacity` resources are resident or loading, further
//!   misses fail with [`CacheError::CacheFull`].
//!
//! # Example
//!
//! ```rust
//! use strata_cache::{CacheError, CacheSource, RefCountCache};
//!
//! struct Squares;
//!
//! impl CacheSource for Squares {
//!     type Item = u64;
//!     type Error = CacheError;
//!
//!     fn fetch(&self, key: u64) -> Result<u64, CacheError> {
//!         Ok(key * key)
//!     }
//!
//!     fn evict(&self, _key: u64, _item: &u64) -> Result<(), CacheError> {
//!         Ok(())
//!     }
//! }
//!
//! let cache = RefCountCache::new(Squares, 16);
//! assert_eq!(*cache.get(12).unwrap(), 144);
//! cache.release(12).unwrap();
//! assert_eq!(cache.resident_count(), 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod refcount;
pub mod stats;

pub use refcount::{CacheSource, RefCountCache};
pub use stats::CacheStats;

use thiserror::Error;

/// Errors raised by the cache itself.
///
/// Sources embed this into their own error type through `From`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Every slot is taken by a pinned or loading resource.
    #[error("cache is full ({capacity} resident entries)")]
    CacheFull {
        /// Configured capacity.
        capacity: usize,
    },
}

impl CacheError {
    /// Returns true if the operation may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CacheFull { .. })
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for strata_common::StrataError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::CacheFull { capacity } => Self::CacheFull { capacity },
        }
    }
}
