//! Wait-for graph and cycle detection.
//!
//! A transaction waits for at most one record at a time, and a record has
//! at most one holder, so every node has at most one outgoing edge:
//!
//! ```text
//! T1 waits for u2, held by T2:  T1 -> T2
//! T2 waits for u3, held by T3:  T2 -> T3
//! T3 waits for u1, held by T1:  T3 -> T1   (cycle = deadlock)
//! ```
//!
//! Detection walks from every root with an explicit stack and stamps each
//! visited transaction with the id of the walk. Reaching a node stamped by
//! the current walk closes a cycle. Reaching one stamped by an earlier walk
//! joins a path already known to be acyclic.

use std::collections::HashMap;

use strata_common::types::{Uid, Xid};

/// Edges of the wait-for graph, stored as the two maps they are derived
/// from.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// Current holder of each locked record.
    holder: HashMap<Uid, Xid>,
    /// The record each blocked transaction waits for.
    waiting_for: HashMap<Xid, Uid>,
}

impl WaitForGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the holder of `uid`.
    pub fn holder(&self, uid: Uid) -> Option<Xid> {
        self.holder.get(&uid).copied()
    }

    /// Records `xid` as the holder of `uid`.
    pub fn set_holder(&mut self, uid: Uid, xid: Xid) {
        self.holder.insert(uid, xid);
    }

    /// Forgets the holder of `uid`.
    pub fn clear_holder(&mut self, uid: Uid) {
        self.holder.remove(&uid);
    }

    /// Returns the record `xid` waits for.
    pub fn waiting_for(&self, xid: Xid) -> Option<Uid> {
        self.waiting_for.get(&xid).copied()
    }

    /// Records that `xid` waits for `uid`.
    pub fn set_waiting(&mut self, xid: Xid, uid: Uid) {
        self.waiting_for.insert(xid, uid);
    }

    /// Forgets what `xid` waits for.
    pub fn clear_waiting(&mut self, xid: Xid) {
        self.waiting_for.remove(&xid);
    }

    /// The transaction `xid` waits on, if any.
    fn successor(&self, xid: Xid) -> Option<Xid> {
        self.waiting_for
            .get(&xid)
            .and_then(|uid| self.holder.get(uid))
            .copied()
    }

    /// Returns true if any walk starting from `roots` closes a cycle.
    pub fn has_cycle(&self, roots: impl IntoIterator<Item = Xid>) -> bool {
        let mut stamps: HashMap<Xid, u64> = HashMap::new();
        let mut epoch = 0u64;

        for root in roots {
            if stamps.contains_key(&root) {
                continue;
            }
            epoch += 1;

            let mut stack = vec![root];
            while let Some(xid) = stack.pop() {
                match stamps.get(&xid) {
                    Some(&stamp) if stamp == epoch => return true,
                    Some(_) => continue,
                    None => {}
                }
                stamps.insert(xid, epoch);
                if let Some(next) = self.successor(xid) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(id: u64) -> Xid {
        Xid::new(id)
    }

    fn u(id: u64) -> Uid {
        Uid::new(id)
    }

    #[test]
    fn test_chain_is_acyclic() {
        let mut graph = WaitForGraph::new();
        graph.set_holder(u(1), x(1));
        graph.set_holder(u(2), x(2));
        graph.set_holder(u(3), x(3));
        graph.set_waiting(x(1), u(2));
        graph.set_waiting(x(2), u(3));

        assert!(!graph.has_cycle([x(1), x(2), x(3)]));
        assert!(!graph.has_cycle([x(3), x(2), x(1)]));
    }

    #[test]
    fn test_three_cycle() {
        let mut graph = WaitForGraph::new();
        for i in 1..=3 {
            graph.set_holder(u(i), x(i));
        }
        graph.set_waiting(x(1), u(2));
        graph.set_waiting(x(2), u(3));
        graph.set_waiting(x(3), u(1));

        assert!(graph.has_cycle([x(2)]));

        graph.clear_waiting(x(3));
        assert!(!graph.has_cycle([x(1), x(2), x(3)]));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let mut graph = WaitForGraph::new();
        let n = 100_000;
        for i in 0..n {
            graph.set_holder(u(i), x(i));
            if i + 1 < n {
                graph.set_waiting(x(i), u(i + 1));
            }
        }
        assert!(!graph.has_cycle((0..n).map(x)));

        graph.set_waiting(x(n - 1), u(0));
        assert!(graph.has_cycle([x(0)]));
    }
}
