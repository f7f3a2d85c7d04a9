//! # strata-storage
//!
//! The data manager of the Strata storage engine.
//!
//! This crate turns one page file and one log into durable, atomically
//! updatable records:
//!
//! - **Pages**: fixed 8 KB pages cached with reference counting
//!   ([`cache::PageCache`])
//! - **Free space**: a bucketed index choosing a page for each insert
//!   ([`index::PageIndex`])
//! - **Data items**: `[valid][size][payload]` records addressed by uid, with
//!   a logged before/after update protocol ([`item::DataItem`])
//! - **Recovery**: redo and undo of the log after an unclean shutdown
//!   ([`recovery`])
//! - **B+Tree**: an ordered `u64 -> uid` index stored in data items
//!   ([`btree::BPlusTree`])
//!
//! # Layering
//!
//! ```text
//!        BPlusTree / version manager
//!                   │
//!                   ▼
//!   ┌─────────────────────────────────┐
//!   │           DataManager           │──── Logger (<path>.log)
//!   │  DataItem cache  │  PageIndex   │
//!   └────────┬────────────────────────┘
//!            ▼
//!   ┌─────────────────────────────────┐
//!   │  PageCache ── PageFile (<path>.db)
//!   └─────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;

/// Page file I/O.
pub mod file;

/// In-memory pages and page layouts.
pub mod page;

/// Reference-counted page cache.
pub mod cache;

/// Free-space index.
pub mod index;

/// Data items and their update protocol.
pub mod item;

/// The data manager.
pub mod manager;

/// Crash recovery.
pub mod recovery;

/// B+Tree index.
pub mod btree;

pub use btree::BPlusTree;
pub use cache::PageCache;
pub use error::{StorageError, StorageResult};
pub use index::{PageIndex, PageInfo};
pub use item::{DataItem, DataItemUpdate};
pub use manager::DataManager;
pub use page::Page;
pub use recovery::RecoveryStats;
