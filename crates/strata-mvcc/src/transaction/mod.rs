//! Transactions.

use std::collections::HashSet;

use parking_lot::Mutex;

use strata_common::types::{IsolationLevel, Xid};

use crate::error::{MvccError, MvccResult};

/// A live transaction as seen by the version manager.
#[derive(Debug)]
pub struct Transaction {
    xid: Xid,
    level: IsolationLevel,
    /// Transactions active when this one began. Empty under read committed.
    snapshot: HashSet<Xid>,
    /// Set when the engine aborted the transaction on the caller's behalf.
    failure: Mutex<Option<String>>,
}

impl Transaction {
    /// Creates a transaction. `active` is only kept for isolation levels
    /// that read from a snapshot.
    pub fn new(xid: Xid, level: IsolationLevel, active: impl IntoIterator<Item = Xid>) -> Self {
        let snapshot = if level.needs_snapshot() {
            active.into_iter().collect()
        } else {
            HashSet::new()
        };
        Self {
            xid,
            level,
            snapshot,
            failure: Mutex::new(None),
        }
    }

    /// The transaction id.
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// The isolation level.
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Returns true if `xid` was active when this transaction began.
    pub fn in_snapshot(&self, xid: Xid) -> bool {
        !xid.is_super() && self.snapshot.contains(&xid)
    }

    /// Number of transactions in the snapshot.
    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    /// Records that the engine aborted this transaction.
    pub(crate) fn fail(&self, reason: impl Into<String>) {
        self.failure.lock().get_or_insert_with(|| reason.into());
    }

    /// Returns true if the engine aborted this transaction.
    pub fn is_auto_aborted(&self) -> bool {
        self.failure.lock().is_some()
    }

    /// Fails if the engine aborted this transaction.
    pub fn check(&self) -> MvccResult<()> {
        match self.failure.lock().as_ref() {
            Some(reason) => Err(MvccError::TransactionAborted {
                xid: self.xid,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}
