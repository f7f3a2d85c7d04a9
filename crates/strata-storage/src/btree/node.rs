//! B+Tree nodes.
//!
//! A node is one data item of fixed size:
//!
//! ```text
//! +-------------+---------------+-----------------+
//! | is_leaf (1) | key_count (2) | sibling uid (8) |
//! +-------------+---------------+-----------------+
//! | son 0 (8) | key 0 (8) | son 1 (8) | key 1 (8) | ... | two spare slots
//! +-----------------------------------------------+
//! ```
//!
//! In a leaf, `son k` is the value stored under `key k`. In an internal
//! node, `son k` covers keys below `key k` and at or above `key k-1`; the
//! rightmost internal node of a level ends with a `u64::MAX` sentinel key.
//! Siblings chain every level left to right.
//!
//! A node splits when it reaches `2 * BALANCE_NUMBER` keys: the first
//! `BALANCE_NUMBER` keys stay, the rest move to a new right sibling.

use std::sync::Arc;

use strata_common::constants::BALANCE_NUMBER;
use strata_common::types::{Uid, Xid};

use crate::error::{StorageError, StorageResult};
use crate::item::DataItem;
use crate::manager::DataManager;

const IS_LEAF_OFFSET: usize = 0;
const KEY_COUNT_OFFSET: usize = IS_LEAF_OFFSET + 1;
const SIBLING_OFFSET: usize = KEY_COUNT_OFFSET + 2;
const HEADER_SIZE: usize = SIBLING_OFFSET + 8;

const SLOT_SIZE: usize = 2 * 8;

/// Key count at which a node splits.
const SPLIT_AT: usize = 2 * BALANCE_NUMBER;

/// Payload size of every node.
pub const NODE_SIZE: usize = HEADER_SIZE + SLOT_SIZE * (SPLIT_AT + 2);

/// Key stored in the last slot of the rightmost internal nodes.
pub const SENTINEL_KEY: u64 = u64::MAX;

fn read_u64(raw: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[at..at + 8]);
    u64::from_be_bytes(buf)
}

fn write_u64(raw: &mut [u8], at: usize, value: u64) {
    raw[at..at + 8].copy_from_slice(&value.to_be_bytes());
}

fn is_leaf(raw: &[u8]) -> bool {
    raw[IS_LEAF_OFFSET] == 1
}

fn set_leaf(raw: &mut [u8], leaf: bool) {
    raw[IS_LEAF_OFFSET] = u8::from(leaf);
}

fn key_count(raw: &[u8]) -> usize {
    u16::from_be_bytes([raw[KEY_COUNT_OFFSET], raw[KEY_COUNT_OFFSET + 1]]) as usize
}

fn set_key_count(raw: &mut [u8], count: usize) {
    raw[KEY_COUNT_OFFSET..KEY_COUNT_OFFSET + 2].copy_from_slice(&(count as u16).to_be_bytes());
}

fn sibling(raw: &[u8]) -> Uid {
    Uid::new(read_u64(raw, SIBLING_OFFSET))
}

fn set_sibling(raw: &mut [u8], uid: Uid) {
    write_u64(raw, SIBLING_OFFSET, uid.as_u64());
}

fn son(raw: &[u8], k: usize) -> Uid {
    Uid::new(read_u64(raw, HEADER_SIZE + k * SLOT_SIZE))
}

fn set_son(raw: &mut [u8], k: usize, uid: Uid) {
    write_u64(raw, HEADER_SIZE + k * SLOT_SIZE, uid.as_u64());
}

fn key(raw: &[u8], k: usize) -> u64 {
    read_u64(raw, HEADER_SIZE + k * SLOT_SIZE + 8)
}

fn set_key(raw: &mut [u8], k: usize, key: u64) {
    write_u64(raw, HEADER_SIZE + k * SLOT_SIZE + 8, key);
}

/// Moves slots `k..` one slot to the right. The last slot falls off.
fn shift_from(raw: &mut [u8], k: usize) {
    let start = HEADER_SIZE + k * SLOT_SIZE;
    raw.copy_within(start..NODE_SIZE - SLOT_SIZE, start + SLOT_SIZE);
}

/// Bytes of an empty leaf root.
pub fn new_nil_root_raw() -> Vec<u8> {
    let mut raw = vec![0u8; NODE_SIZE];
    set_leaf(&mut raw, true);
    set_key_count(&mut raw, 0);
    set_sibling(&mut raw, Uid::NONE);
    raw
}

/// Bytes of an internal root `[left][key][right][SENTINEL]`.
pub fn new_root_raw(left: Uid, right: Uid, key: u64) -> Vec<u8> {
    let mut raw = vec![0u8; NODE_SIZE];
    set_leaf(&mut raw, false);
    set_key_count(&mut raw, 2);
    set_sibling(&mut raw, Uid::NONE);
    set_son(&mut raw, 0, left);
    set_key(&mut raw, 0, key);
    set_son(&mut raw, 1, right);
    set_key(&mut raw, 1, SENTINEL_KEY);
    raw
}

/// Writes `(son, key)` in sorted position. Returns false if the key belongs
/// to the right sibling.
fn insert_raw(raw: &mut [u8], uid: Uid, new_key: u64) -> bool {
    let count = key_count(raw);
    let k = (0..count)
        .find(|&k| key(raw, k) >= new_key)
        .unwrap_or(count);
    if k == count && !sibling(raw).is_none() {
        return false;
    }

    if is_leaf(raw) {
        shift_from(raw, k);
        set_key(raw, k, new_key);
        set_son(raw, k, uid);
    } else {
        // son k keeps the keys below new_key, the new son takes
        // [new_key, old key k).
        let upper = key(raw, k);
        set_key(raw, k, new_key);
        shift_from(raw, k + 1);
        set_key(raw, k + 1, upper);
        set_son(raw, k + 1, uid);
    }
    set_key_count(raw, count + 1);
    true
}

/// Bytes of the right half of a full node.
fn split_raw(raw: &[u8]) -> Vec<u8> {
    let mut right = vec![0u8; NODE_SIZE];
    set_leaf(&mut right, is_leaf(raw));
    set_key_count(&mut right, BALANCE_NUMBER);
    set_sibling(&mut right, sibling(raw));
    let from = HEADER_SIZE + BALANCE_NUMBER * SLOT_SIZE;
    right[HEADER_SIZE..HEADER_SIZE + NODE_SIZE - from].copy_from_slice(&raw[from..NODE_SIZE]);
    right
}

fn leaf_range_raw(raw: &[u8], lo: u64, hi: u64) -> LeafRange {
    let count = key_count(raw);
    let mut k = (0..count).find(|&k| key(raw, k) >= lo).unwrap_or(count);
    let mut uids = Vec::new();
    while k < count && key(raw, k) <= hi {
        uids.push(son(raw, k));
        k += 1;
    }
    let sibling = if k == count { sibling(raw) } else { Uid::NONE };
    LeafRange { uids, sibling }
}

/// Result of [`Node::search_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchNext {
    /// Descend into this child.
    Child(Uid),
    /// The key lies beyond this node; continue in the sibling.
    Sibling(Uid),
}

/// Result of [`Node::leaf_search_range`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafRange {
    /// Values whose keys fall in the range.
    pub uids: Vec<Uid>,
    /// Leaf to continue in, `Uid::NONE` when the range ends here.
    pub sibling: Uid,
}

/// Result of [`Node::insert_and_split`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The pair was inserted.
    Inserted,
    /// The pair was inserted and the node split. The parent must add
    /// `(key, sibling)`.
    Split {
        /// The new right node.
        sibling: Uid,
        /// Its first key.
        key: u64,
    },
    /// The key belongs to the right sibling; retry there.
    MoveRight(Uid),
}

/// A loaded node. Must be handed back with [`Node::release`].
pub struct Node<'a> {
    dm: &'a DataManager,
    item: Arc<DataItem>,
}

impl<'a> Node<'a> {
    /// Loads the node stored at `uid`.
    pub fn load(dm: &'a DataManager, uid: Uid) -> StorageResult<Self> {
        let item = dm.read(uid)?.ok_or(StorageError::DataNotFound { uid })?;
        if item.data_len() != NODE_SIZE {
            let len = item.data_len();
            dm.release(&item)?;
            return Err(StorageError::corrupt_page(
                uid.page_no(),
                format!("b+tree node {:?} has {} bytes", uid, len),
            ));
        }
        Ok(Self { dm, item })
    }

    /// Releases the node.
    pub fn release(self) -> StorageResult<()> {
        self.dm.release(&self.item)
    }

    /// Address of the node.
    pub fn uid(&self) -> Uid {
        self.item.uid()
    }

    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        self.item.with_data(is_leaf)
    }

    /// Number of keys in the node.
    pub fn key_count(&self) -> usize {
        self.item.with_data(key_count)
    }

    /// The right sibling, `Uid::NONE` for the last node of a level.
    pub fn sibling(&self) -> Uid {
        self.item.with_data(sibling)
    }

    /// Copies the `(key, son)` pairs out.
    pub fn entries(&self) -> Vec<(u64, Uid)> {
        self.item
            .with_data(|raw| (0..key_count(raw)).map(|k| (key(raw, k), son(raw, k))).collect())
    }

    /// Finds the child covering `search`: the son of the first key strictly
    /// greater than it.
    pub fn search_next(&self, search: u64) -> SearchNext {
        self.item.with_data(|raw| {
            let count = key_count(raw);
            if let Some(k) = (0..count).find(|&k| search < key(raw, k)) {
                return SearchNext::Child(son(raw, k));
            }
            let next = sibling(raw);
            if next.is_none() && count > 0 && !is_leaf(raw) {
                // Only the sentinel itself reaches here.
                return SearchNext::Child(son(raw, count - 1));
            }
            SearchNext::Sibling(next)
        })
    }

    /// Collects the values of keys in `[lo, hi]`.
    pub fn leaf_search_range(&self, lo: u64, hi: u64) -> LeafRange {
        self.item.with_data(|raw| leaf_range_raw(raw, lo, hi))
    }

    /// Inserts `(key, uid)` and splits the node if it is full.
    ///
    /// Node changes are logged under the super transaction.
    pub fn insert_and_split(&self, uid: Uid, key: u64) -> StorageResult<InsertOutcome> {
        let mut update = self.item.before();

        if !update.with_data_mut(|raw| insert_raw(raw, uid, key)) {
            let next = update.with_data_mut(|raw| sibling(raw));
            update.un_before();
            return Ok(InsertOutcome::MoveRight(next));
        }

        let right = update.with_data_mut(|raw| {
            if key_count(raw) == SPLIT_AT {
                Some(split_raw(raw))
            } else {
                None
            }
        });
        let Some(right) = right else {
            update.after(Xid::SUPER)?;
            return Ok(InsertOutcome::Inserted);
        };

        // An error here drops the update, which restores the node.
        let sibling_uid = self.dm.insert(Xid::SUPER, &right)?;
        update.with_data_mut(|raw| {
            set_key_count(raw, BALANCE_NUMBER);
            set_sibling(raw, sibling_uid);
        });
        update.after(Xid::SUPER)?;

        Ok(InsertOutcome::Split {
            sibling: sibling_uid,
            key: self::key(&right, 0),
        })
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("uid", &self.uid())
            .field("leaf", &self.is_leaf())
            .field("keys", &self.key_count())
            .field("sibling", &self.sibling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(keys: &[u64]) -> Vec<u8> {
        let mut raw = new_nil_root_raw();
        for &k in keys {
            assert!(insert_raw(&mut raw, Uid::new(k + 1000), k));
        }
        raw
    }

    #[test]
    fn test_node_size() {
        assert_eq!(NODE_SIZE, 11 + 16 * 66);
    }

    #[test]
    fn test_leaf_insert_keeps_order() {
        let raw = leaf_with(&[5, 1, 3, 3, 9]);
        let keys: Vec<u64> = (0..key_count(&raw)).map(|k| key(&raw, k)).collect();
        assert_eq!(keys, vec![1, 3, 3, 5, 9]);
        assert_eq!(son(&raw, 0), Uid::new(1001));
        assert_eq!(son(&raw, 4), Uid::new(1009));
    }

    #[test]
    fn test_insert_past_last_key_moves_right() {
        let mut raw = leaf_with(&[1, 2]);
        set_sibling(&mut raw, Uid::new(77));
        assert!(!insert_raw(&mut raw, Uid::new(1), 10));
        assert_eq!(key_count(&raw), 2);
        assert!(insert_raw(&mut raw, Uid::new(1), 2));
    }

    #[test]
    fn test_internal_insert_splits_range() {
        let left = Uid::new(10);
        let right = Uid::new(20);
        let mut raw = new_root_raw(left, right, 100);
        assert!(insert_raw(&mut raw, Uid::new(30), 150));

        // [left]100[right]150[new]MAX
        assert_eq!(key_count(&raw), 3);
        assert_eq!(son(&raw, 0), left);
        assert_eq!(key(&raw, 0), 100);
        assert_eq!(son(&raw, 1), right);
        assert_eq!(key(&raw, 1), 150);
        assert_eq!(son(&raw, 2), Uid::new(30));
        assert_eq!(key(&raw, 2), SENTINEL_KEY);
    }

    #[test]
    fn test_split_raw_takes_upper_half() {
        let keys: Vec<u64> = (0..SPLIT_AT as u64).collect();
        let mut raw = leaf_with(&keys);
        set_sibling(&mut raw, Uid::new(99));

        let right = split_raw(&raw);
        assert!(is_leaf(&right));
        assert_eq!(key_count(&right), BALANCE_NUMBER);
        assert_eq!(sibling(&right), Uid::new(99));
        assert_eq!(key(&right, 0), BALANCE_NUMBER as u64);
        assert_eq!(key(&right, BALANCE_NUMBER - 1), SPLIT_AT as u64 - 1);
    }

    #[test]
    fn test_leaf_range_continues_only_at_node_end() {
        let mut raw = leaf_with(&[2, 4, 6]);
        set_sibling(&mut raw, Uid::new(55));

        let inner = leaf_range_raw(&raw, 3, 5);
        assert_eq!(inner.uids, vec![Uid::new(1004)]);
        assert_eq!(inner.sibling, Uid::NONE);

        let tail = leaf_range_raw(&raw, 4, 100);
        assert_eq!(tail.uids, vec![Uid::new(1004), Uid::new(1006)]);
        assert_eq!(tail.sibling, Uid::new(55));

        let empty = leaf_range_raw(&raw, 7, 9);
        assert!(empty.uids.is_empty());
        assert_eq!(empty.sibling, Uid::new(55));
    }
}
