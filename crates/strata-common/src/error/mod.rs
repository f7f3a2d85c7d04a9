//! Error handling for Strata.
//!
//! This module provides the unified error type and result alias used at the
//! engine boundary. Each subsystem crate has its own error enum that converts
//! into [`StrataError`].

mod engine;

pub use engine::{ErrorCode, StrataError};

/// Result type alias for Strata operations.
pub type StrataResult<T> = std::result::Result<T, StrataError>;
