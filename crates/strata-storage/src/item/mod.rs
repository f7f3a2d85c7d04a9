//! Data items.
//!
//! A data item is a length-prefixed record inside a data page:
//!
//! ```text
//! +-----------+----------+---------------------+
//! | valid (1) | size (2) | payload (size)      |
//! +-----------+----------+---------------------+
//! ```
//!
//! `valid == 0` means the item is live. Deleting an item only flips the
//! flag; the bytes stay in the page.
//!
//! # Updating in place
//!
//! ```text
//!   item.before()  ──► write latch + page dirty + copy of the old bytes
//!        │
//!   update.with_data_mut(|d| ...)   (live page bytes)
//!        │
//!        ├──► update.after(xid)   log [old][new], keep the change
//!        └──► update.un_before()  restore the old bytes
//! ```
//!
//! Dropping an unfinished [`DataItemUpdate`] restores the old bytes as
//! `un_before` does.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::warn;

use strata_common::constants::PAGE_SIZE;
use strata_common::types::{Uid, Xid};
use strata_wal::{LogRecord, Logger};

use crate::error::{StorageError, StorageResult};
use crate::page::Page;

/// Offset of the valid flag in an item.
const VALID_OFFSET: usize = 0;
/// Offset of the size field in an item.
const SIZE_OFFSET: usize = 1;
/// Offset of the payload in an item.
const DATA_OFFSET: usize = 3;

const VALID: u8 = 0;
const INVALID: u8 = 1;

/// A resident data item.
///
/// The item pins its page for as long as it is cached. Payload access goes
/// through the item latch: readers share it, an update holds it exclusively.
pub struct DataItem {
    uid: Uid,
    page: Arc<Page>,
    /// Offset of the item inside the page.
    offset: usize,
    /// Length of the whole item including its header.
    len: usize,
    latch: RwLock<()>,
    logger: Arc<Logger>,
}

impl DataItem {
    /// Size of the item header.
    pub const HEADER_SIZE: usize = DATA_OFFSET;

    /// Builds the bytes of a new, valid item holding `data`.
    pub fn wrap_raw(data: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(DATA_OFFSET + data.len());
        raw.push(VALID);
        raw.extend_from_slice(&(data.len() as u16).to_be_bytes());
        raw.extend_from_slice(data);
        raw
    }

    /// Marks raw item bytes as deleted.
    pub fn set_raw_invalid(raw: &mut [u8]) {
        raw[VALID_OFFSET] = INVALID;
    }

    /// Parses the item at `uid` out of its pinned page.
    pub(crate) fn load(uid: Uid, page: Arc<Page>, logger: Arc<Logger>) -> StorageResult<Self> {
        let offset = uid.offset() as usize;
        let len = {
            let raw = page.lock();
            if offset + DATA_OFFSET > PAGE_SIZE {
                return Err(StorageError::corrupt_page(
                    page.page_no(),
                    format!("item header at offset {} crosses page end", offset),
                ));
            }
            let size = u16::from_be_bytes([raw[offset + SIZE_OFFSET], raw[offset + SIZE_OFFSET + 1]]);
            DATA_OFFSET + size as usize
        };
        if offset + len > PAGE_SIZE {
            return Err(StorageError::corrupt_page(
                page.page_no(),
                format!("item of {} bytes at offset {} crosses page end", len, offset),
            ));
        }

        Ok(Self {
            uid,
            page,
            offset,
            len,
            latch: RwLock::new(()),
            logger,
        })
    }

    /// Address of the item.
    #[inline]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// The page holding the item.
    #[inline]
    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Payload length.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.len - DATA_OFFSET
    }

    /// Returns true if the item has not been deleted.
    pub fn is_valid(&self) -> bool {
        let _latch = self.latch.read();
        self.page.lock()[self.offset + VALID_OFFSET] == VALID
    }

    /// Runs `f` over the payload under the read latch.
    pub fn with_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let _latch = self.latch.read();
        let raw = self.page.lock();
        f(&raw[self.offset + DATA_OFFSET..self.offset + self.len])
    }

    /// Copies the payload out.
    pub fn data(&self) -> Bytes {
        self.with_data(Bytes::copy_from_slice)
    }

    /// Starts an in-place update.
    ///
    /// Blocks until no reader or other update holds the item.
    pub fn before(&self) -> DataItemUpdate<'_> {
        let latch = self.latch.write();
        self.page.set_dirty(true);
        let old_raw = Bytes::copy_from_slice(self.raw_range(&self.page.lock()));
        DataItemUpdate {
            item: self,
            _latch: latch,
            old_raw,
            finished: false,
        }
    }

    fn raw_range<'a>(&self, page: &'a [u8]) -> &'a [u8] {
        &page[self.offset..self.offset + self.len]
    }
}

impl std::fmt::Debug for DataItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataItem")
            .field("uid", &self.uid)
            .field("len", &self.len)
            .finish()
    }
}

/// An in-flight update of a [`DataItem`].
///
/// Holds the item's write latch until it is finished or dropped.
pub struct DataItemUpdate<'a> {
    item: &'a DataItem,
    _latch: RwLockWriteGuard<'a, ()>,
    old_raw: Bytes,
    finished: bool,
}

impl DataItemUpdate<'_> {
    /// The item being updated.
    pub fn item(&self) -> &DataItem {
        self.item
    }

    /// Copies the current payload out, including uncommitted changes.
    pub fn data(&self) -> Bytes {
        let raw = self.item.page.lock();
        let start = self.item.offset + DATA_OFFSET;
        Bytes::copy_from_slice(&raw[start..self.item.offset + self.item.len])
    }

    /// Runs `f` over the live payload bytes.
    pub fn with_data_mut<R>(&mut self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut raw = self.item.page.lock();
        let start = self.item.offset + DATA_OFFSET;
        f(&mut raw[start..self.item.offset + self.item.len])
    }

    /// Logs the change on behalf of `xid` and keeps it.
    ///
    /// If the log write fails the old bytes are restored.
    pub fn after(mut self, xid: Xid) -> StorageResult<()> {
        let new_raw = Bytes::copy_from_slice(self.item.raw_range(&self.item.page.lock()));
        let record = LogRecord::update(xid, self.item.uid, self.old_raw.clone(), new_raw);
        self.item.logger.log(&record.encode())?;
        self.finished = true;
        Ok(())
    }

    /// Discards the change.
    pub fn un_before(mut self) {
        self.restore();
        self.finished = true;
    }

    fn restore(&mut self) {
        let mut raw = self.item.page.lock();
        raw[self.item.offset..self.item.offset + self.item.len].copy_from_slice(&self.old_raw);
    }
}

impl Drop for DataItemUpdate<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(uid = ?self.item.uid, "data item update dropped unfinished, restoring");
            self.restore();
        }
    }
}
