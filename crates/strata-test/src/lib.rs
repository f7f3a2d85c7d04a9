//! # strata-test
//!
//! Integration tests for Strata.
//!
//! This crate contains:
//! - Scratch database helpers ([`utils`])
//! - Workload generators ([`workload`])
//!
//! The scenarios themselves live in `tests/`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Test utilities and helpers
pub mod utils;

/// Workload generators
pub mod workload;
