//! Configuration for Strata.
//!
//! This module provides configuration structures for the engine components.

mod engine;

pub use engine::{EngineConfig, PageCacheConfig, VersionConfig};
