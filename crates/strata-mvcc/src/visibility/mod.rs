//! Visibility rules.
//!
//! A record is visible to transaction `t` when its creator's effects are
//! visible to `t` and its deleter's are not:
//!
//! | level            | creator must be                                 | deleter must be                                   |
//! |------------------|-------------------------------------------------|---------------------------------------------------|
//! | read committed   | `t` itself, or committed                        | none, or not `t` and not committed                |
//! | repeatable read  | `t` itself, or committed before `t` began       | none, or not `t` and not committed before `t` began |
//!
//! "Committed before `t` began" means committed, older than `t`, and not in
//! `t`'s snapshot. A record created by `t` and deleted by `t` is invisible.

use strata_common::types::{IsolationLevel, Xid};
use strata_txn::{TransactionOracle, TxnResult};

use crate::transaction::Transaction;

/// The creator and deleter of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionStamp {
    /// Creating transaction.
    pub xmin: Xid,
    /// Deleting transaction, `Xid::SUPER` while alive.
    pub xmax: Xid,
}

impl VersionStamp {
    /// Returns true if no transaction has deleted the record.
    pub fn is_alive(&self) -> bool {
        self.xmax.is_super()
    }
}

/// Returns true if `t` must not act on the record because a transaction it
/// cannot see already deleted it. Never true under read committed.
pub fn is_version_skip<O>(tm: &O, t: &Transaction, stamp: VersionStamp) -> TxnResult<bool>
where
    O: TransactionOracle + ?Sized,
{
    if t.level() == IsolationLevel::ReadCommitted || stamp.is_alive() {
        return Ok(false);
    }
    let xmax = stamp.xmax;
    Ok(tm.is_committed(xmax)? && (xmax > t.xid() || t.in_snapshot(xmax)))
}

/// Returns true if `t` sees the record.
pub fn is_visible<O>(tm: &O, t: &Transaction, stamp: VersionStamp) -> TxnResult<bool>
where
    O: TransactionOracle + ?Sized,
{
    match t.level() {
        IsolationLevel::ReadCommitted => read_committed(tm, t, stamp),
        IsolationLevel::RepeatableRead => repeatable_read(tm, t, stamp),
    }
}

fn read_committed<O>(tm: &O, t: &Transaction, stamp: VersionStamp) -> TxnResult<bool>
where
    O: TransactionOracle + ?Sized,
{
    let VersionStamp { xmin, xmax } = stamp;
    if xmin == t.xid() && stamp.is_alive() {
        return Ok(true);
    }
    if !tm.is_committed(xmin)? {
        return Ok(false);
    }
    if stamp.is_alive() {
        return Ok(true);
    }
    Ok(xmax != t.xid() && !tm.is_committed(xmax)?)
}

fn repeatable_read<O>(tm: &O, t: &Transaction, stamp: VersionStamp) -> TxnResult<bool>
where
    O: TransactionOracle + ?Sized,
{
    let VersionStamp { xmin, xmax } = stamp;
    if xmin == t.xid() && stamp.is_alive() {
        return Ok(true);
    }
    if !(tm.is_committed(xmin)? && xmin < t.xid() && !t.in_snapshot(xmin)) {
        return Ok(false);
    }
    if stamp.is_alive() {
        return Ok(true);
    }
    if xmax == t.xid() {
        return Ok(false);
    }
    Ok(!tm.is_committed(xmax)? || xmax > t.xid() || t.in_snapshot(xmax))
}
