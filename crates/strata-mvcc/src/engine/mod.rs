//! The engine facade.
//!
//! Opens the three database files derived from one [`EngineConfig`] and
//! exposes the version manager's transactional operations.
//!
//! ```text
//!   <path>.xid ── TransactionManager ─┐
//!   <path>.db  ─┐                     ├── VersionManager
//!   <path>.log ─┴─ DataManager ───────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use strata_common::config::EngineConfig;
use strata_common::types::{IsolationLevel, Uid, Xid};
use strata_common::StrataResult;
use strata_storage::{BPlusTree, DataManager};
use strata_txn::{TransactionManager, TransactionOracle};

use crate::manager::VersionManager;

/// An open database.
pub struct Engine {
    config: EngineConfig,
    tm: Arc<TransactionManager>,
    dm: Arc<DataManager>,
    vm: VersionManager,
}

impl Engine {
    /// Creates a new database. Fails if any of its files exist.
    pub fn create(config: EngineConfig) -> StrataResult<Self> {
        config.validate()?;
        let tm = Arc::new(TransactionManager::create(config.xid_path())?);
        let dm = Arc::new(DataManager::create(&config)?);
        info!(path = %config.path.display(), "created database");
        Ok(Self::assemble(config, tm, dm))
    }

    /// Opens an existing database, recovering it if it was not closed
    /// cleanly.
    pub fn open(config: EngineConfig) -> StrataResult<Self> {
        config.validate()?;
        let tm = Arc::new(TransactionManager::open(config.xid_path())?);
        let dm = Arc::new(DataManager::open(&config, tm.as_ref())?);
        info!(path = %config.path.display(), "opened database");
        Ok(Self::assemble(config, tm, dm))
    }

    fn assemble(config: EngineConfig, tm: Arc<TransactionManager>, dm: Arc<DataManager>) -> Self {
        let oracle: Arc<dyn TransactionOracle> = Arc::clone(&tm) as Arc<dyn TransactionOracle>;
        let vm = VersionManager::new(oracle, Arc::clone(&dm));
        Self { config, tm, dm, vm }
    }

    /// The configuration the engine was opened with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The data manager.
    pub fn data_manager(&self) -> &Arc<DataManager> {
        &self.dm
    }

    /// The version manager.
    pub fn version_manager(&self) -> &VersionManager {
        &self.vm
    }

    /// The transaction status file.
    pub fn transactions(&self) -> &TransactionManager {
        &self.tm
    }

    /// Starts a transaction at the configured default isolation level.
    pub fn begin_default(&self) -> StrataResult<Xid> {
        self.begin(self.config.version.default_isolation)
    }

    /// Starts a transaction.
    pub fn begin(&self, level: IsolationLevel) -> StrataResult<Xid> {
        Ok(self.vm.begin(level)?)
    }

    /// Reads a record as `xid` sees it.
    pub fn read(&self, xid: Xid, uid: Uid) -> StrataResult<Option<Bytes>> {
        Ok(self.vm.read(xid, uid)?)
    }

    /// Inserts a record.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> StrataResult<Uid> {
        Ok(self.vm.insert(xid, data)?)
    }

    /// Deletes a record.
    pub fn delete(&self, xid: Xid, uid: Uid) -> StrataResult<bool> {
        Ok(self.vm.delete(xid, uid)?)
    }

    /// Commits a transaction.
    pub fn commit(&self, xid: Xid) -> StrataResult<()> {
        Ok(self.vm.commit(xid)?)
    }

    /// Aborts a transaction.
    pub fn abort(&self, xid: Xid) -> StrataResult<()> {
        Ok(self.vm.abort(xid)?)
    }

    /// Creates an empty B+Tree index and returns its handle uid.
    pub fn create_index(&self) -> StrataResult<Uid> {
        Ok(BPlusTree::create(&self.dm)?)
    }

    /// Opens the B+Tree index created under `boot`.
    pub fn open_index(&self, boot: Uid) -> StrataResult<BPlusTree> {
        Ok(BPlusTree::load(boot, Arc::clone(&self.dm))?)
    }

    /// Flushes everything and marks the shutdown clean.
    pub fn close(&self) -> StrataResult<()> {
        self.vm.close()?;
        self.dm.close()?;
        self.tm.close()?;
        info!(path = %self.config.path.display(), "closed database");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.config.path)
            .field("vm", &self.vm)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::StrataError;
    use tempfile::TempDir;

    #[test]
    fn test_create_close_open() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::for_testing(tmp.path().join("db"));

        let engine = Engine::create(config.clone()).unwrap();
        let xid = engine.begin_default().unwrap();
        let uid = engine.insert(xid, b"persisted").unwrap();
        engine.commit(xid).unwrap();
        engine.close().unwrap();

        let engine = Engine::open(config).unwrap();
        let reader = engine.begin(IsolationLevel::RepeatableRead).unwrap();
        assert_eq!(&engine.read(reader, uid).unwrap().unwrap()[..], b"persisted");
        engine.commit(reader).unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_create_refuses_existing() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::for_testing(tmp.path().join("db"));
        Engine::create(config.clone()).unwrap().close().unwrap();
        assert!(Engine::create(config).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::for_testing(tmp.path().join("db")).with_cache_memory(1024);
        assert!(matches!(
            Engine::create(config),
            Err(StrataError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_index_through_engine() {
        let tmp = TempDir::new().unwrap();
        let engine = Engine::create(EngineConfig::for_testing(tmp.path().join("db"))).unwrap();
        let xid = engine.begin_default().unwrap();
        let row = engine.insert(xid, b"indexed").unwrap();
        engine.commit(xid).unwrap();

        let boot = engine.create_index().unwrap();
        let index = engine.open_index(boot).unwrap();
        index.insert(17, row).unwrap();
        assert_eq!(index.search(17).unwrap(), vec![row]);
        index.close().unwrap();
        engine.close().unwrap();
    }
}
