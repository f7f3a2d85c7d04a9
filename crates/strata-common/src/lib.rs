//! # strata-common
//!
//! Common types, errors, and configuration for the Strata storage engine.
//!
//! This crate provides the foundational pieces shared by every Strata
//! component:
//!
//! - **Types**: Core identifiers (`PageNo`, `Uid`, `Xid`)
//! - **Errors**: Unified error handling with `StrataError`
//! - **Config**: Engine configuration structures
//! - **Constants**: On-disk format constants and limits
//!
//! ## Example
//!
//! ```rust
//! use strata_common::types::{PageNo, Uid, Xid};
//!
//! let uid = Uid::from_parts(PageNo::new(3), 120);
//! assert_eq!(uid.page_no(), PageNo::new(3));
//! assert_eq!(uid.offset(), 120);
//! assert!(Xid::SUPER.is_super());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

pub use constants::*;
pub use error::{ErrorCode, StrataError, StrataResult};
pub use types::{IsolationLevel, PageNo, Uid, Xid};
