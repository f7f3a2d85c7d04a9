//! Versioned records.
//!
//! ```text
//! +-----------+-----------+-----------------+
//! | xmin (8)  | xmax (8)  | payload ...     |
//! +-----------+-----------+-----------------+
//! ```
//!
//! `xmin` created the record. `xmax` deleted it, or is 0 while the record
//! is alive. `xmax` is the only field that ever changes, and only through
//! the data item update protocol.

use std::sync::Arc;

use bytes::Bytes;

use strata_common::types::{Uid, Xid};
use strata_storage::{DataItem, DataManager, StorageResult};

use crate::error::{MvccError, MvccResult};
use crate::visibility::VersionStamp;

const XMIN_OFFSET: usize = 0;
const XMAX_OFFSET: usize = XMIN_OFFSET + 8;
const DATA_OFFSET: usize = XMAX_OFFSET + 8;

fn read_xid(raw: &[u8], at: usize) -> Xid {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&raw[at..at + 8]);
    Xid::from_be_bytes(buf)
}

/// A versioned record backed by a data item.
pub struct Entry {
    item: Arc<DataItem>,
}

impl Entry {
    /// Size of the entry header.
    pub const HEADER_SIZE: usize = DATA_OFFSET;

    /// Builds the bytes of a record created by `xid`.
    pub fn wrap_raw(xid: Xid, data: &[u8]) -> Vec<u8> {
        let mut raw = Vec::with_capacity(DATA_OFFSET + data.len());
        raw.extend_from_slice(&xid.to_be_bytes());
        raw.extend_from_slice(&Xid::SUPER.to_be_bytes());
        raw.extend_from_slice(data);
        raw
    }

    /// Interprets a data item as an entry.
    pub fn from_item(item: Arc<DataItem>) -> MvccResult<Self> {
        if item.data_len() < DATA_OFFSET {
            return Err(MvccError::NotAnEntry {
                uid: item.uid(),
                len: item.data_len(),
            });
        }
        Ok(Self { item })
    }

    /// Address of the entry.
    pub fn uid(&self) -> Uid {
        self.item.uid()
    }

    /// Creating transaction.
    pub fn xmin(&self) -> Xid {
        self.item.with_data(|raw| read_xid(raw, XMIN_OFFSET))
    }

    /// Deleting transaction, `Xid::SUPER` while alive.
    pub fn xmax(&self) -> Xid {
        self.item.with_data(|raw| read_xid(raw, XMAX_OFFSET))
    }

    /// Both stamps, read together.
    pub fn stamp(&self) -> VersionStamp {
        self.item.with_data(|raw| VersionStamp {
            xmin: read_xid(raw, XMIN_OFFSET),
            xmax: read_xid(raw, XMAX_OFFSET),
        })
    }

    /// Copies the payload out.
    pub fn data(&self) -> Bytes {
        self.item
            .with_data(|raw| Bytes::copy_from_slice(&raw[DATA_OFFSET..]))
    }

    /// Marks the record deleted by `xid`. The change is logged under `xid`.
    pub fn set_xmax(&self, xid: Xid) -> StorageResult<()> {
        let mut update = self.item.before();
        update.with_data_mut(|raw| {
            raw[XMAX_OFFSET..XMAX_OFFSET + 8].copy_from_slice(&xid.to_be_bytes());
        });
        update.after(xid)
    }

    /// Releases the backing data item. `xmax` is left untouched.
    pub fn remove(&self, dm: &DataManager) -> StorageResult<()> {
        dm.release(&self.item)
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stamp = self.stamp();
        f.debug_struct("Entry")
            .field("uid", &self.uid())
            .field("xmin", &stamp.xmin)
            .field("xmax", &stamp.xmax)
            .finish()
    }
}
