//! Type definitions for Strata.
//!
//! This module contains the identifier types shared across the engine and
//! the transaction isolation levels.

mod ids;
mod isolation;

pub use ids::{PageNo, Uid, Xid};
pub use isolation::IsolationLevel;
