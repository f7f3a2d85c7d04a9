//! Scratch databases for tests.

use std::path::PathBuf;
use std::sync::Once;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use strata_common::config::EngineConfig;
use strata_common::StrataResult;
use strata_mvcc::Engine;

static TRACING: Once = Once::new();

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every
/// test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A database living in a temporary directory.
///
/// The directory is removed when the value is dropped.
pub struct TestDb {
    dir: TempDir,
    config: EngineConfig,
}

impl TestDb {
    /// Prepares a fresh directory. No files are created yet.
    pub fn new() -> std::io::Result<Self> {
        init_tracing();
        let dir = TempDir::new()?;
        let config = EngineConfig::for_testing(dir.path().join("strata"));
        Ok(Self { dir, config })
    }

    /// The configuration of the database.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The temporary directory.
    pub fn dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Creates the database files.
    pub fn create(&self) -> StrataResult<Engine> {
        Engine::create(self.config.clone())
    }

    /// Opens the existing database files.
    pub fn open(&self) -> StrataResult<Engine> {
        Engine::open(self.config.clone())
    }

    /// Drops `engine` without closing it, leaving the files as a crash
    /// would.
    pub fn crash(&self, engine: Engine) {
        drop(engine);
    }
}
