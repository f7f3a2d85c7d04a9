//! B+Tree index over data items.
//!
//! Maps `u64` keys to uids. Nodes are data items written through the data
//! manager; the tree is reached through a small boot item holding the root
//! uid, so the handle returned by [`BPlusTree::create`] stays stable when
//! the root splits.
//!
//! ```text
//!   boot item ──► root ──► ... internal ... ──► leaf ─► leaf ─► leaf
//!                                              (sibling chain)
//! ```
//!
//! Duplicate keys are allowed. `u64::MAX` is the internal sentinel key.

mod node;

pub use node::{InsertOutcome, LeafRange, Node, SearchNext, NODE_SIZE, SENTINEL_KEY};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use strata_common::types::{Uid, Xid};

use crate::error::{StorageError, StorageResult};
use crate::item::DataItem;
use crate::manager::DataManager;

/// A B+Tree handle.
pub struct BPlusTree {
    dm: Arc<DataManager>,
    boot_uid: Uid,
    boot: Arc<DataItem>,
    /// Serializes root replacement.
    boot_lock: Mutex<()>,
}

impl BPlusTree {
    /// Creates an empty tree and returns its boot uid.
    pub fn create(dm: &DataManager) -> StorageResult<Uid> {
        let root = dm.insert(Xid::SUPER, &node::new_nil_root_raw())?;
        let boot = dm.insert(Xid::SUPER, &root.to_be_bytes())?;
        debug!(boot = ?boot, root = ?root, "created b+tree");
        Ok(boot)
    }

    /// Opens the tree whose boot item is `boot_uid`.
    pub fn load(boot_uid: Uid, dm: Arc<DataManager>) -> StorageResult<Self> {
        let boot = dm
            .read(boot_uid)?
            .ok_or(StorageError::DataNotFound { uid: boot_uid })?;
        Ok(Self {
            dm,
            boot_uid,
            boot,
            boot_lock: Mutex::new(()),
        })
    }

    /// The boot uid of this tree.
    pub fn boot_uid(&self) -> Uid {
        self.boot_uid
    }

    /// Current root node.
    pub fn root_uid(&self) -> Uid {
        let _guard = self.boot_lock.lock();
        self.read_root()
    }

    fn read_root(&self) -> Uid {
        self.boot.with_data(|raw| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&raw[..8]);
            Uid::from_be_bytes(buf)
        })
    }

    /// Puts a new root above `left` and `right`. If another insert has
    /// already replaced `left` as the root, the pair goes into the level
    /// above `left` instead.
    fn grow_root(&self, left: Uid, height: usize, right: Uid, key: u64) -> StorageResult<()> {
        {
            let _guard = self.boot_lock.lock();
            if self.read_root() == left {
                let root = self
                    .dm
                    .insert(Xid::SUPER, &node::new_root_raw(left, right, key))?;
                let mut update = self.boot.before();
                update.with_data_mut(|raw| raw[..8].copy_from_slice(&root.to_be_bytes()));
                update.after(Xid::SUPER)?;
                debug!(root = ?root, key, "b+tree root split");
                return Ok(());
            }
        }
        debug!(old_root = ?left, key, "root already replaced, linking split below it");
        self.insert_at_level(key, right, height + 1)
    }

    /// Returns every value stored under `key`.
    pub fn search(&self, key: u64) -> StorageResult<Vec<Uid>> {
        self.search_range(key, key)
    }

    /// Returns every value whose key is in `[lo, hi]`, in key order.
    pub fn search_range(&self, lo: u64, hi: u64) -> StorageResult<Vec<Uid>> {
        let mut leaf = self.search_leaf(self.root_uid(), lo)?;
        let mut uids = Vec::new();
        loop {
            let node = Node::load(&self.dm, leaf)?;
            let range = node.leaf_search_range(lo, hi);
            node.release()?;

            uids.extend(range.uids);
            if range.sibling.is_none() {
                return Ok(uids);
            }
            leaf = range.sibling;
        }
    }

    /// Inserts `(key, uid)`.
    pub fn insert(&self, key: u64, uid: Uid) -> StorageResult<()> {
        self.insert_at_level(key, uid, 0)
    }

    /// Inserts `(key, value)` into the nodes `level` steps above the leaves.
    fn insert_at_level(&self, key: u64, value: Uid, level: usize) -> StorageResult<()> {
        let root = self.root_uid();
        let height = self.height(root)?;
        if height < level {
            return Err(StorageError::corrupt_page(
                root.page_no(),
                format!("b+tree root {:?} is below level {}", root, level),
            ));
        }
        if let Some((sibling, split_key)) = self.insert_at(root, height, value, key, level)? {
            self.grow_root(root, height, sibling, split_key)?;
        }
        Ok(())
    }

    fn is_leaf(&self, uid: Uid) -> StorageResult<bool> {
        let node = Node::load(&self.dm, uid)?;
        let leaf = node.is_leaf();
        node.release()?;
        Ok(leaf)
    }

    /// Levels between `uid` and the leaves. Leaves have height 0.
    fn height(&self, mut uid: Uid) -> StorageResult<usize> {
        let mut height = 0;
        loop {
            let node = Node::load(&self.dm, uid)?;
            let leaf = node.is_leaf();
            let first = if leaf {
                None
            } else {
                node.entries().first().map(|&(_, child)| child)
            };
            node.release()?;
            match first {
                Some(child) => {
                    uid = child;
                    height += 1;
                }
                None if leaf => return Ok(height),
                None => {
                    return Err(StorageError::corrupt_page(
                        uid.page_no(),
                        format!("b+tree node {:?} has no children", uid),
                    ))
                }
            }
        }
    }

    fn search_leaf(&self, mut uid: Uid, key: u64) -> StorageResult<Uid> {
        while !self.is_leaf(uid)? {
            uid = self.search_next(uid, key)?;
        }
        Ok(uid)
    }

    /// Child of the internal node `uid` covering `key`, following sibling
    /// links if the node was split concurrently.
    fn search_next(&self, mut uid: Uid, key: u64) -> StorageResult<Uid> {
        loop {
            let node = Node::load(&self.dm, uid)?;
            let next = node.search_next(key);
            node.release()?;
            match next {
                SearchNext::Child(child) => return Ok(child),
                SearchNext::Sibling(sibling) if !sibling.is_none() => uid = sibling,
                SearchNext::Sibling(_) => {
                    return Err(StorageError::corrupt_page(
                        uid.page_no(),
                        format!("b+tree node {:?} has no child for key {}", uid, key),
                    ))
                }
            }
        }
    }

    /// Inserts below `uid`, which sits `height` levels above the leaves,
    /// into the node at `level`. Returns the `(sibling, key)` pair the
    /// caller must add if `uid` split.
    fn insert_at(
        &self,
        uid: Uid,
        height: usize,
        value: Uid,
        key: u64,
        level: usize,
    ) -> StorageResult<Option<(Uid, u64)>> {
        if height == level {
            return self.insert_and_split(uid, value, key);
        }

        let child = self.search_next(uid, key)?;
        match self.insert_at(child, height - 1, value, key, level)? {
            Some((sibling, split_key)) => self.insert_and_split(uid, sibling, split_key),
            None => Ok(None),
        }
    }

    fn insert_and_split(
        &self,
        mut uid: Uid,
        value: Uid,
        key: u64,
    ) -> StorageResult<Option<(Uid, u64)>> {
        loop {
            let node = Node::load(&self.dm, uid)?;
            let outcome = node.insert_and_split(value, key);
            node.release()?;
            match outcome? {
                InsertOutcome::Inserted => return Ok(None),
                InsertOutcome::Split { sibling, key } => return Ok(Some((sibling, key))),
                InsertOutcome::MoveRight(sibling) => uid = sibling,
            }
        }
    }

    /// Releases the boot item.
    pub fn close(&self) -> StorageResult<()> {
        self.dm.release(&self.boot)
    }
}

impl std::fmt::Debug for BPlusTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("boot", &self.boot_uid)
            .field("root", &self.root_uid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use strata_common::config::EngineConfig;
    use strata_common::constants::BALANCE_NUMBER;
    use strata_txn::TransactionManager;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        dm: Arc<DataManager>,
        tree: BPlusTree,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let config = EngineConfig::for_testing(tmp.path().join("db"));
        let dm = Arc::new(DataManager::create(&config).unwrap());
        let boot = BPlusTree::create(&dm).unwrap();
        let tree = BPlusTree::load(boot, Arc::clone(&dm)).unwrap();
        Fixture { tmp, dm, tree }
    }

    fn value(key: u64) -> Uid {
        Uid::new(key + 1_000_000)
    }

    #[test]
    fn test_empty_tree() {
        let f = fixture();
        assert!(f.tree.search(1).unwrap().is_empty());
        assert!(f.tree.search_range(0, u64::MAX - 1).unwrap().is_empty());
        assert!(Node::load(&f.dm, f.tree.root_uid()).unwrap().is_leaf());
    }

    #[test]
    fn test_insert_and_search() {
        let f = fixture();
        for key in [7, 3, 11, 3] {
            f.tree.insert(key, value(key)).unwrap();
        }
        assert_eq!(f.tree.search(7).unwrap(), vec![value(7)]);
        assert_eq!(f.tree.search(3).unwrap(), vec![value(3), value(3)]);
        assert!(f.tree.search(4).unwrap().is_empty());
        assert_eq!(
            f.tree.search_range(4, 20).unwrap(),
            vec![value(7), value(11)]
        );
    }

    #[test]
    fn test_split_at_full_node() {
        let f = fixture();
        let old_root = f.tree.root_uid();
        for key in 0..(2 * BALANCE_NUMBER as u64 - 1) {
            f.tree.insert(key, value(key)).unwrap();
        }
        assert_eq!(f.tree.root_uid(), old_root);

        f.tree.insert(63, value(63)).unwrap();
        let root = f.tree.root_uid();
        assert_ne!(root, old_root);

        let left = Node::load(&f.dm, old_root).unwrap();
        let left_entries = left.entries();
        let right_uid = left.sibling();
        left.release().unwrap();
        assert_eq!(left_entries.len(), BALANCE_NUMBER);
        assert_eq!(left_entries[0].0, 0);
        assert_eq!(left_entries[BALANCE_NUMBER - 1].0, 31);

        let right = Node::load(&f.dm, right_uid).unwrap();
        assert_eq!(right.key_count(), BALANCE_NUMBER);
        assert_eq!(right.entries()[0], (32, value(32)));
        assert!(right.sibling().is_none());
        right.release().unwrap();

        let root_node = Node::load(&f.dm, root).unwrap();
        assert!(!root_node.is_leaf());
        assert_eq!(
            root_node.entries(),
            vec![(32, old_root), (SENTINEL_KEY, right_uid)]
        );
        root_node.release().unwrap();

        // The 65th key lands in the right leaf without another split.
        f.tree.insert(64, value(64)).unwrap();
        assert_eq!(f.tree.root_uid(), root);
        let right = Node::load(&f.dm, right_uid).unwrap();
        assert_eq!(right.key_count(), BALANCE_NUMBER + 1);
        right.release().unwrap();

        let all = f.tree.search_range(0, 64).unwrap();
        assert_eq!(all, (0..=64).map(value).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_under_replaced_root_is_linked() {
        let f = fixture();
        let old_root = f.tree.root_uid();
        for key in 0..(2 * BALANCE_NUMBER as u64 - 1) {
            f.tree.insert(key, value(key)).unwrap();
        }

        // First writer splits the root leaf but has not grown the root yet.
        let first = f
            .tree
            .insert_at(old_root, 0, value(63), 63, 0)
            .unwrap()
            .unwrap();
        assert_eq!(first.1, BALANCE_NUMBER as u64);

        // Second writer, also starting from the old root, fills and splits
        // the new right leaf, then grows the root first.
        let mut second = None;
        for key in 64..(64 + BALANCE_NUMBER as u64) {
            second = f.tree.insert_at(old_root, 0, value(key), key, 0).unwrap();
        }
        let second = second.unwrap();
        assert_eq!(second.1, 64);
        f.tree.grow_root(old_root, 0, second.0, second.1).unwrap();

        f.tree.grow_root(old_root, 0, first.0, first.1).unwrap();

        let root = Node::load(&f.dm, f.tree.root_uid()).unwrap();
        assert_eq!(
            root.entries(),
            vec![(32, old_root), (64, first.0), (SENTINEL_KEY, second.0)]
        );
        root.release().unwrap();

        for key in [10, 40, 70] {
            assert_eq!(f.tree.search(key).unwrap(), vec![value(key)]);
        }
        let all = f.tree.search_range(0, 95).unwrap();
        assert_eq!(all, (0..=95).map(value).collect::<Vec<_>>());
    }

    #[test]
    fn test_random_inserts_stay_ordered() {
        let f = fixture();
        let mut keys: Vec<u64> = (0..1000).map(|k| k * 3).collect();
        keys.shuffle(&mut rand::rngs::StdRng::seed_from_u64(7));
        for &key in &keys {
            f.tree.insert(key, value(key)).unwrap();
        }

        for key in [0, 3, 1500, 2997] {
            assert_eq!(f.tree.search(key).unwrap(), vec![value(key)]);
        }
        assert!(f.tree.search(1).unwrap().is_empty());

        let range = f.tree.search_range(300, 600).unwrap();
        let expected: Vec<Uid> = (100..=200).map(|k| value(k * 3)).collect();
        assert_eq!(range, expected);
        assert_eq!(f.tree.search_range(0, u64::MAX - 1).unwrap().len(), 1000);
    }

    #[test]
    fn test_tree_survives_reopen() {
        let f = fixture();
        for key in 0..200 {
            f.tree.insert(key, value(key)).unwrap();
        }
        let boot = f.tree.boot_uid();
        f.tree.close().unwrap();
        f.dm.close().unwrap();

        let config = EngineConfig::for_testing(f.tmp.path().join("db"));
        let tm = TransactionManager::create(config.xid_path()).unwrap();
        let dm = Arc::new(DataManager::open(&config, &tm).unwrap());
        let tree = BPlusTree::load(boot, Arc::clone(&dm)).unwrap();
        assert_eq!(tree.search_range(50, 59).unwrap(), (50..60).map(value).collect::<Vec<_>>());
        tree.close().unwrap();
        dm.close().unwrap();
    }

    #[test]
    fn test_tree_recovers_after_crash() {
        let f = fixture();
        for key in 0..100 {
            f.tree.insert(key, value(key)).unwrap();
        }
        let boot = f.tree.boot_uid();
        let Fixture { tmp, dm, tree } = f;
        drop(tree);
        drop(dm);

        let config = EngineConfig::for_testing(tmp.path().join("db"));
        let tm = TransactionManager::create(config.xid_path()).unwrap();
        let dm = Arc::new(DataManager::open(&config, &tm).unwrap());
        let tree = BPlusTree::load(boot, Arc::clone(&dm)).unwrap();
        assert_eq!(tree.search_range(0, 99).unwrap().len(), 100);
        assert_eq!(tree.search(42).unwrap(), vec![value(42)]);
    }
}
