//! # strata-mvcc
//!
//! Multi-version records on top of the data manager.
//!
//! This crate implements:
//! - Entries: `[xmin][xmax][payload]` records ([`Entry`])
//! - Read-committed and repeatable-read visibility ([`visibility`])
//! - The version manager: begin / read / insert / delete / commit / abort
//!   with record locks and deadlock victims ([`VersionManager`])
//! - The engine facade wiring all files from one [`EngineConfig`]
//!   ([`Engine`])
//!
//! [`EngineConfig`]: strata_common::config::EngineConfig
//!
//! # Example
//!
//! ```rust,no_run
//! use strata_common::config::EngineConfig;
//! use strata_common::IsolationLevel;
//! use strata_mvcc::Engine;
//!
//! # fn main() -> strata_common::StrataResult<()> {
//! let engine = Engine::create(EngineConfig::with_path("/tmp/strata-demo"))?;
//! let xid = engine.begin(IsolationLevel::ReadCommitted)?;
//! let uid = engine.insert(xid, b"hello")?;
//! engine.commit(xid)?;
//!
//! let reader = engine.begin(IsolationLevel::RepeatableRead)?;
//! assert_eq!(engine.read(reader, uid)?.as_deref(), Some(&b"hello"[..]));
//! engine.commit(reader)?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;

/// Versioned records.
pub mod entry;

/// Transactions and snapshots.
pub mod transaction;

/// Visibility rules.
pub mod visibility;

/// The version manager.
pub mod manager;

/// The engine facade.
pub mod engine;

pub use engine::Engine;
pub use entry::Entry;
pub use error::{MvccError, MvccResult};
pub use manager::VersionManager;
pub use transaction::Transaction;
pub use visibility::VersionStamp;
