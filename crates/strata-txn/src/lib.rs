//! # strata-txn
//!
//! Transaction bookkeeping for Strata.
//!
//! - **Status file**: [`TransactionManager`] allocates transaction ids and
//!   persists whether each one is active, committed or aborted.
//! - **Lock table**: [`LockTable`] serializes writers of the same record and
//!   refuses requests that would close a cycle in the wait-for graph.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Version manager                     │
//! │         │                              │             │
//! │         ▼                              ▼             │
//! │ ┌────────────────────┐      ┌──────────────────────┐ │
//! │ │ TransactionManager │      │      LockTable       │ │
//! │ │   (<path>.xid)     │      │  holds / waits / ... │ │
//! │ └────────────────────┘      └──────────┬───────────┘ │
//! │                                        ▼             │
//! │                              ┌──────────────────────┐│
//! │                              │    WaitForGraph      ││
//! │                              │  (cycle detection)   ││
//! │                              └──────────────────────┘│
//! └──────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;

/// Transaction status file.
///
/// This module provides:
/// - [`manager::TransactionManager`]: the file-backed oracle
/// - [`manager::TransactionOracle`]: the queries the rest of the engine uses
/// - [`manager::XidStatus`]: the persisted states
pub mod manager;

/// Record lock table.
pub mod lock;

/// Deadlock detection over the wait-for graph.
pub mod deadlock;

pub use deadlock::WaitForGraph;
pub use error::{TxnError, TxnResult};
pub use lock::{LockStats, LockTable, LockWaiter};
pub use manager::{TransactionManager, TransactionOracle, XidStatus};
