//! Engine configuration structures.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{DB_SUFFIX, LOG_SUFFIX, MIN_CACHE_PAGES, PAGE_SIZE, XID_SUFFIX};
use crate::error::{StrataError, StrataResult};
use crate::types::IsolationLevel;

/// Main engine configuration.
///
/// `path` is a base path; the page file, log and transaction status file are
/// derived from it by appending `.db`, `.log` and `.xid`.
///
/// # Example
///
/// ```rust
/// use strata_common::config::EngineConfig;
///
/// let config = EngineConfig::with_path("/tmp/demo");
/// assert_eq!(config.db_path().to_str(), Some("/tmp/demo.db"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base path of the database files.
    pub path: PathBuf,

    /// Page cache configuration.
    pub page_cache: PageCacheConfig,

    /// Version manager configuration.
    pub version: VersionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./strata"),
            page_cache: PageCacheConfig::default(),
            version: VersionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration rooted at the given base path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Creates a small configuration for tests.
    #[must_use]
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_cache: PageCacheConfig {
                memory_bytes: 64 * PAGE_SIZE,
            },
            version: VersionConfig::default(),
        }
    }

    /// Sets the page cache memory budget.
    #[must_use]
    pub fn with_cache_memory(mut self, memory_bytes: usize) -> Self {
        self.page_cache.memory_bytes = memory_bytes;
        self
    }

    /// Path of the page file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        with_suffix(&self.path, DB_SUFFIX)
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        with_suffix(&self.path, LOG_SUFFIX)
    }

    /// Path of the transaction status file.
    #[must_use]
    pub fn xid_path(&self) -> PathBuf {
        with_suffix(&self.path, XID_SUFFIX)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StrataError::invalid_config("path must not be empty"));
        }
        self.page_cache.validate()
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw = base.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Page cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCacheConfig {
    /// Memory budget in bytes. Capacity is `memory_bytes / PAGE_SIZE` pages.
    /// Default: 64 MB
    pub memory_bytes: usize,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            memory_bytes: 64 * 1024 * 1024,
        }
    }
}

impl PageCacheConfig {
    /// Number of pages the cache may hold.
    #[must_use]
    pub const fn capacity_pages(&self) -> usize {
        self.memory_bytes / PAGE_SIZE
    }

    /// Validates the configuration.
    pub fn validate(&self) -> StrataResult<()> {
        if self.capacity_pages() < MIN_CACHE_PAGES {
            return Err(StrataError::invalid_config(format!(
                "page_cache.memory_bytes must hold at least {} pages, got {} bytes",
                MIN_CACHE_PAGES, self.memory_bytes
            )));
        }
        Ok(())
    }
}

/// Version manager configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Isolation level used by `Engine::begin_default`.
    pub default_isolation: IsolationLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_cache.capacity_pages(), 8192);
    }

    #[test]
    fn test_file_paths() {
        let config = EngineConfig::with_path("/var/lib/strata/main");
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/strata/main.db"));
        assert_eq!(config.log_path(), PathBuf::from("/var/lib/strata/main.log"));
        assert_eq!(config.xid_path(), PathBuf::from("/var/lib/strata/main.xid"));
    }

    #[test]
    fn test_cache_too_small() {
        let config = EngineConfig::with_path("/tmp/x").with_cache_memory(9 * PAGE_SIZE);
        assert!(config.validate().is_err());

        let config = EngineConfig::with_path("/tmp/x").with_cache_memory(10 * PAGE_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut config = EngineConfig::for_testing("/tmp/serde");
        config.version.default_isolation = IsolationLevel::RepeatableRead;

        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, config.path);
        assert_eq!(back.page_cache.memory_bytes, 64 * PAGE_SIZE);
        assert_eq!(back.version.default_isolation, IsolationLevel::RepeatableRead);
    }
}
