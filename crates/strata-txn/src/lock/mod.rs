//! Record lock table.
//!
//! Each record has at most one holder. A transaction asking for a record
//! held by someone else joins that record's FIFO wait queue and receives a
//! [`LockWaiter`] to block on. When the holder finishes, [`LockTable::remove`]
//! hands each of its records to the first live waiter and wakes it.
//!
//! A request that would close a cycle in the wait-for graph is refused with
//! [`TxnError::Deadlock`] and leaves no trace in the table.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use strata_common::types::{Uid, Xid};

use crate::deadlock::WaitForGraph;
use crate::error::{TxnError, TxnResult};

/// Outcome delivered to a blocked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Granted,
    Cancelled,
}

/// One-shot handle a blocked transaction waits on.
#[derive(Debug)]
pub struct LockWaiter {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl LockWaiter {
    fn new() -> Self {
        Self {
            state: Mutex::new(WaitState::Waiting),
            cond: Condvar::new(),
        }
    }

    /// Blocks until the record is granted or the wait is cancelled.
    ///
    /// Returns true if the record was granted. A wait is cancelled when the
    /// waiting transaction is removed from the table while still blocked.
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == WaitState::Waiting {
            self.cond.wait(&mut state);
        }
        *state == WaitState::Granted
    }

    /// Returns true once the record has been granted.
    pub fn is_granted(&self) -> bool {
        *self.state.lock() == WaitState::Granted
    }

    fn finish(&self, outcome: WaitState) {
        *self.state.lock() = outcome;
        self.cond.notify_all();
    }
}

/// Lock table statistics.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Records granted without waiting.
    pub immediate_grants: AtomicU64,
    /// Requests that had to wait.
    pub waits: AtomicU64,
    /// Records handed over to a waiter.
    pub handoffs: AtomicU64,
    /// Requests refused as deadlocks.
    pub deadlocks: AtomicU64,
}

impl LockStats {
    /// Returns requests refused as deadlocks.
    pub fn deadlocks(&self) -> u64 {
        self.deadlocks.load(Ordering::Relaxed)
    }

    /// Returns requests that had to wait.
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct LockState {
    /// Records held by each transaction, in grant order.
    holds: HashMap<Xid, Vec<Uid>>,
    /// Transactions waiting for each record, oldest first.
    waiters: HashMap<Uid, VecDeque<Xid>>,
    /// Handle of each blocked transaction.
    handles: HashMap<Xid, Arc<LockWaiter>>,
    graph: WaitForGraph,
}

impl LockState {
    fn holds(&self, xid: Xid, uid: Uid) -> bool {
        self.holds.get(&xid).is_some_and(|uids| uids.contains(&uid))
    }

    fn grant(&mut self, xid: Xid, uid: Uid) {
        self.graph.set_holder(uid, xid);
        self.holds.entry(xid).or_default().push(uid);
    }

    fn remove_waiter(&mut self, uid: Uid, xid: Xid) {
        if let Some(queue) = self.waiters.get_mut(&uid) {
            queue.retain(|&w| w != xid);
            if queue.is_empty() {
                self.waiters.remove(&uid);
            }
        }
    }

    /// Gives `uid` to its first waiter that is still blocked.
    fn hand_over(&mut self, uid: Uid) -> Option<(Xid, Arc<LockWaiter>)> {
        self.graph.clear_holder(uid);
        let mut queue = self.waiters.remove(&uid)?;

        let mut next = None;
        while let Some(xid) = queue.pop_front() {
            if let Some(handle) = self.handles.remove(&xid) {
                next = Some((xid, handle));
                break;
            }
        }
        if !queue.is_empty() {
            self.waiters.insert(uid, queue);
        }

        let (xid, handle) = next?;
        self.graph.clear_waiting(xid);
        self.grant(xid, uid);
        Some((xid, handle))
    }
}

/// The record lock table.
#[derive(Default)]
pub struct LockTable {
    state: Mutex<LockState>,
    stats: LockStats,
}

impl LockTable {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `uid` for `xid`.
    ///
    /// Returns `Ok(None)` if the record is now held by `xid`, or a waiter the
    /// caller must block on before touching the record.
    pub fn add(&self, xid: Xid, uid: Uid) -> TxnResult<Option<Arc<LockWaiter>>> {
        let mut state = self.state.lock();

        if state.holds(xid, uid) {
            return Ok(None);
        }
        if state.graph.holder(uid).is_none() {
            state.grant(xid, uid);
            self.stats.immediate_grants.fetch_add(1, Ordering::Relaxed);
            trace!(%xid, ?uid, "lock granted");
            return Ok(None);
        }

        state.graph.set_waiting(xid, uid);
        state.waiters.entry(uid).or_default().push_back(xid);

        let roots: Vec<Xid> = state.holds.keys().copied().collect();
        if state.graph.has_cycle(roots) {
            state.graph.clear_waiting(xid);
            state.remove_waiter(uid, xid);
            self.stats.deadlocks.fetch_add(1, Ordering::Relaxed);
            debug!(%xid, ?uid, "deadlock detected, refusing lock");
            return Err(TxnError::Deadlock { xid, uid });
        }

        let handle = Arc::new(LockWaiter::new());
        state.handles.insert(xid, Arc::clone(&handle));
        self.stats.waits.fetch_add(1, Ordering::Relaxed);
        trace!(%xid, ?uid, "lock wait");
        Ok(Some(handle))
    }

    /// Releases everything `xid` holds and drops any wait it has pending.
    ///
    /// Safe to call for a transaction that never touched the table.
    pub fn remove(&self, xid: Xid) {
        let mut woken = Vec::new();
        {
            let mut state = self.state.lock();

            let held = state.holds.remove(&xid).unwrap_or_default();
            for uid in held {
                if let Some(next) = state.hand_over(uid) {
                    woken.push(next);
                }
            }

            if let Some(uid) = state.graph.waiting_for(xid) {
                state.graph.clear_waiting(xid);
                state.remove_waiter(uid, xid);
            }
            if let Some(handle) = state.handles.remove(&xid) {
                handle.finish(WaitState::Cancelled);
            }
        }

        for (next, handle) in woken {
            self.stats.handoffs.fetch_add(1, Ordering::Relaxed);
            trace!(from = %xid, to = %next, "lock handed over");
            handle.finish(WaitState::Granted);
        }
    }

    /// Returns the holder of `uid`.
    pub fn holder(&self, uid: Uid) -> Option<Xid> {
        self.state.lock().graph.holder(uid)
    }

    /// Returns the record `xid` is blocked on.
    pub fn waiting_for(&self, xid: Xid) -> Option<Uid> {
        self.state.lock().graph.waiting_for(xid)
    }

    /// Returns the queue of transactions waiting for `uid`.
    pub fn waiters(&self, uid: Uid) -> Vec<Xid> {
        self.state
            .lock()
            .waiters
            .get(&uid)
            .map(|queue| queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the records `xid` holds.
    pub fn held_by(&self, xid: Xid) -> Vec<Uid> {
        self.state
            .lock()
            .holds
            .get(&xid)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the lock statistics.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LockTable")
            .field("holders", &state.holds.len())
            .field("blocked", &state.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn x(id: u64) -> Xid {
        Xid::new(id)
    }

    fn u(id: u64) -> Uid {
        Uid::new(id)
    }

    #[test]
    fn test_grant_and_reentry() {
        let table = LockTable::new();
        assert!(table.add(x(1), u(10)).unwrap().is_none());
        assert!(table.add(x(1), u(10)).unwrap().is_none());
        assert_eq!(table.holder(u(10)), Some(x(1)));
        assert_eq!(table.held_by(x(1)), vec![u(10)]);
    }

    #[test]
    fn test_wait_then_handoff() {
        let table = Arc::new(LockTable::new());
        table.add(x(1), u(10)).unwrap();

        let waiter = table.add(x(2), u(10)).unwrap().expect("must wait");
        assert!(!waiter.is_granted());
        assert_eq!(table.waiting_for(x(2)), Some(u(10)));

        let blocked = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(20));
        table.remove(x(1));

        assert!(blocked.join().unwrap());
        assert_eq!(table.holder(u(10)), Some(x(2)));
        assert_eq!(table.waiting_for(x(2)), None);
        assert!(table.waiters(u(10)).is_empty());

        // The new holder's records are released with it.
        table.remove(x(2));
        assert_eq!(table.holder(u(10)), None);
    }

    #[test]
    fn test_fifo_skips_removed_waiters() {
        let table = LockTable::new();
        table.add(x(1), u(10)).unwrap();
        let w2 = table.add(x(2), u(10)).unwrap().unwrap();
        let w3 = table.add(x(3), u(10)).unwrap().unwrap();
        assert_eq!(table.waiters(u(10)), vec![x(2), x(3)]);

        // x2 gives up while blocked.
        table.remove(x(2));
        assert!(!w2.wait());

        table.remove(x(1));
        assert!(w3.wait());
        assert_eq!(table.holder(u(10)), Some(x(3)));
    }

    #[test]
    fn test_two_party_deadlock_leaves_no_edges() {
        let table = LockTable::new();
        table.add(x(1), u(1)).unwrap();
        table.add(x(2), u(2)).unwrap();

        let a_waits = table.add(x(1), u(2)).unwrap();
        assert!(a_waits.is_some());

        let err = table.add(x(2), u(1)).unwrap_err();
        assert!(matches!(err, TxnError::Deadlock { xid, uid } if xid == x(2) && uid == u(1)));
        assert_eq!(table.waiting_for(x(2)), None);
        assert!(table.waiters(u(1)).is_empty());
        assert_eq!(table.stats().deadlocks(), 1);

        // Aborting the victim lets the survivor through.
        table.remove(x(2));
        assert!(a_waits.unwrap().wait());
        assert_eq!(table.holder(u(2)), Some(x(1)));
    }

    #[test]
    fn test_three_party_deadlock() {
        let table = LockTable::new();
        for i in 1..=3 {
            table.add(x(i), u(i)).unwrap();
        }
        assert!(table.add(x(1), u(2)).unwrap().is_some());
        assert!(table.add(x(2), u(3)).unwrap().is_some());
        assert!(table.add(x(3), u(1)).is_err());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let table = LockTable::new();
        table.remove(x(42));
        assert_eq!(table.holder(u(1)), None);
    }
}
