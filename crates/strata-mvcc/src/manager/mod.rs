//! The version manager.
//!
//! ```text
//!   begin ──► Transaction { xid, level, snapshot }
//!
//!   read(xid, uid)    entry cache ─► visibility ─► payload | None
//!   insert(xid, data) DataManager::insert([xid][0][data])
//!   delete(xid, uid)  visibility ─► LockTable::add ─► (wait) ─► set xmax
//!
//!   commit / abort    oracle status ─► LockTable::remove
//! ```
//!
//! A transaction that closes a deadlock cycle is aborted by the engine. The
//! failing call returns the deadlock; every later call on the transaction
//! returns [`MvccError::TransactionAborted`] until the caller aborts it.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use strata_cache::{CacheSource, CacheStats, RefCountCache};
use strata_common::types::{IsolationLevel, Uid, Xid};
use strata_storage::{DataManager, StorageError};
use strata_txn::{LockStats, LockTable, TransactionOracle, TxnError};

use crate::entry::Entry;
use crate::error::{MvccError, MvccResult};
use crate::transaction::Transaction;
use crate::visibility;

/// Loads entries through the data manager.
struct EntrySource {
    dm: Arc<DataManager>,
}

impl CacheSource for EntrySource {
    type Item = Entry;
    type Error = MvccError;

    fn fetch(&self, key: u64) -> MvccResult<Entry> {
        let uid = Uid::new(key);
        let item = self
            .dm
            .read(uid)?
            .ok_or(StorageError::DataNotFound { uid })?;
        match Entry::from_item(Arc::clone(&item)) {
            Ok(entry) => Ok(entry),
            Err(err) => {
                self.dm.release(&item)?;
                Err(err)
            }
        }
    }

    fn evict(&self, _key: u64, entry: &Entry) -> MvccResult<()> {
        entry.remove(&self.dm)?;
        Ok(())
    }
}

/// The version manager.
pub struct VersionManager {
    tm: Arc<dyn TransactionOracle>,
    dm: Arc<DataManager>,
    entries: RefCountCache<EntrySource>,
    active: Mutex<HashMap<Xid, Arc<Transaction>>>,
    locks: LockTable,
}

impl VersionManager {
    /// Creates a version manager over an oracle and a data manager.
    pub fn new(tm: Arc<dyn TransactionOracle>, dm: Arc<DataManager>) -> Self {
        let source = EntrySource {
            dm: Arc::clone(&dm),
        };
        Self {
            tm,
            dm,
            entries: RefCountCache::new(source, 0),
            active: Mutex::new(HashMap::new()),
            locks: LockTable::new(),
        }
    }

    /// Starts a transaction.
    pub fn begin(&self, level: IsolationLevel) -> MvccResult<Xid> {
        let mut active = self.active.lock();
        let xid = self.tm.begin()?;
        let t = Transaction::new(xid, level, active.keys().copied());
        active.insert(xid, Arc::new(t));
        debug!(%xid, %level, "began transaction");
        Ok(xid)
    }

    fn transaction(&self, xid: Xid) -> MvccResult<Arc<Transaction>> {
        self.active
            .lock()
            .get(&xid)
            .cloned()
            .ok_or(MvccError::UnknownTransaction { xid })
    }

    /// Loads an entry, `None` if its data item is gone.
    fn entry(&self, uid: Uid) -> MvccResult<Option<Arc<Entry>>> {
        match self.entries.get(uid.as_u64()) {
            Ok(entry) => Ok(Some(entry)),
            Err(MvccError::Storage(StorageError::DataNotFound { .. })) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn release_entry(&self, entry: &Entry) -> MvccResult<()> {
        self.entries.release(entry.uid().as_u64())
    }

    /// Returns the payload of `uid` if `xid` can see it.
    pub fn read(&self, xid: Xid, uid: Uid) -> MvccResult<Option<Bytes>> {
        let t = self.transaction(xid)?;
        t.check()?;

        let Some(entry) = self.entry(uid)? else {
            return Ok(None);
        };
        let visible = visibility::is_visible(self.tm.as_ref(), &t, entry.stamp());
        let data: MvccResult<Option<Bytes>> = match visible {
            Ok(true) => Ok(Some(entry.data())),
            Ok(false) => Ok(None),
            Err(err) => Err(err.into()),
        };
        self.release_entry(&entry)?;
        data
    }

    /// Inserts a record created by `xid`.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> MvccResult<Uid> {
        let t = self.transaction(xid)?;
        t.check()?;
        Ok(self.dm.insert(xid, &Entry::wrap_raw(xid, data))?)
    }

    /// Deletes `uid` on behalf of `xid`.
    ///
    /// Returns false if `xid` cannot see the record, already deleted it, or
    /// it was deleted by a transaction `xid` cannot see. May block while
    /// another transaction holds the record.
    pub fn delete(&self, xid: Xid, uid: Uid) -> MvccResult<bool> {
        let t = self.transaction(xid)?;
        t.check()?;

        let Some(entry) = self.entry(uid)? else {
            return Ok(false);
        };
        let deleted = self.delete_entry(&t, &entry);
        self.release_entry(&entry)?;
        deleted
    }

    fn delete_entry(&self, t: &Transaction, entry: &Entry) -> MvccResult<bool> {
        if !visibility::is_visible(self.tm.as_ref(), t, entry.stamp())? {
            return Ok(false);
        }

        match self.locks.add(t.xid(), entry.uid()) {
            Ok(None) => {}
            Ok(Some(waiter)) => {
                if !waiter.wait() {
                    return Err(MvccError::TransactionAborted {
                        xid: t.xid(),
                        reason: format!("lock wait on {:?} cancelled", entry.uid()),
                    });
                }
            }
            Err(err @ TxnError::Deadlock { .. }) => {
                warn!(xid = %t.xid(), uid = ?entry.uid(), "deadlock victim, aborting");
                self.auto_abort(t, "deadlock")?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }

        // The previous holder may have finished while we waited.
        let stamp = entry.stamp();
        if stamp.xmax == t.xid() {
            return Ok(false);
        }
        if visibility::is_version_skip(self.tm.as_ref(), t, stamp)? {
            debug!(xid = %t.xid(), uid = ?entry.uid(), "delete skipped, newer version deleted");
            return Ok(false);
        }
        if !visibility::is_visible(self.tm.as_ref(), t, stamp)? {
            return Ok(false);
        }

        entry.set_xmax(t.xid())?;
        Ok(true)
    }

    fn auto_abort(&self, t: &Transaction, reason: &str) -> MvccResult<()> {
        t.fail(reason);
        self.locks.remove(t.xid());
        self.tm.abort(t.xid())?;
        Ok(())
    }

    /// Commits `xid`.
    pub fn commit(&self, xid: Xid) -> MvccResult<()> {
        let t = self.transaction(xid)?;
        t.check()?;

        self.tm.commit(xid)?;
        self.active.lock().remove(&xid);
        self.locks.remove(xid);
        debug!(%xid, "committed transaction");
        Ok(())
    }

    /// Aborts `xid`. Aborting a transaction the engine already aborted only
    /// forgets it.
    pub fn abort(&self, xid: Xid) -> MvccResult<()> {
        let t = self
            .active
            .lock()
            .remove(&xid)
            .ok_or(MvccError::UnknownTransaction { xid })?;
        if t.is_auto_aborted() {
            return Ok(());
        }

        self.locks.remove(xid);
        self.tm.abort(xid)?;
        debug!(%xid, "aborted transaction");
        Ok(())
    }

    /// Number of running transactions.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Lock table statistics.
    pub fn lock_stats(&self) -> &LockStats {
        self.locks.stats()
    }

    /// Entry cache statistics.
    pub fn entry_stats(&self) -> &CacheStats {
        self.entries.stats()
    }

    /// Releases every cached entry.
    pub fn close(&self) -> MvccResult<()> {
        self.entries.close()
    }
}

impl std::fmt::Debug for VersionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionManager")
            .field("active", &self.active_count())
            .field("entries", &self.entries)
            .finish()
    }
}
