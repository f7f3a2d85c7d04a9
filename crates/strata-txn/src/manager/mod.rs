//! File-backed transaction status oracle.
//!
//! # File Format
//!
//! ```text
//! +-------------+----------+----------+-----+----------+
//! | counter (8) | xid 1    | xid 2    | ... | xid N    |
//! +-------------+----------+----------+-----+----------+
//!                 1 byte each: 0 active, 1 committed, 2 aborted
//! ```
//!
//! `counter` is the last allocated id. The file is valid only when its
//! length is exactly `8 + counter`. Id 0 is the super transaction: it has no
//! status byte and is always committed.
//!
//! # Transaction States
//!
//! ```text
//! ┌───────┐    begin()    ┌────────┐
//! │ Start │──────────────▶│ Active │
//! └───────┘               └────────┘
//!                              │
//!                    ┌─────────┴───────┐
//!               commit()           abort()
//!                    ▼                 ▼
//!             ┌───────────┐     ┌──────────┐
//!             │ Committed │     │ Aborted  │
//!             └───────────┘     └──────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, error};

use strata_common::types::Xid;

use crate::error::{TxnError, TxnResult};

/// Size of the counter header.
const HEADER_SIZE: u64 = 8;

/// Persisted state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum XidStatus {
    /// Running, or interrupted by a crash before finishing.
    Active = 0,
    /// Committed.
    Committed = 1,
    /// Aborted.
    Aborted = 2,
}

impl XidStatus {
    /// Decodes a status byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Active),
            1 => Some(Self::Committed),
            2 => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// The queries the engine makes about transactions.
///
/// Implemented by [`TransactionManager`]; visibility checks are written
/// against this trait.
pub trait TransactionOracle: Send + Sync {
    /// Allocates a new active transaction.
    fn begin(&self) -> TxnResult<Xid>;

    /// Marks a transaction committed.
    fn commit(&self, xid: Xid) -> TxnResult<()>;

    /// Marks a transaction aborted.
    fn abort(&self, xid: Xid) -> TxnResult<()>;

    /// Returns the persisted status of a transaction.
    fn status(&self, xid: Xid) -> TxnResult<XidStatus>;

    /// Returns true if the transaction is active.
    fn is_active(&self, xid: Xid) -> TxnResult<bool> {
        if xid.is_super() {
            return Ok(false);
        }
        Ok(self.status(xid)? == XidStatus::Active)
    }

    /// Returns true if the transaction committed. Always true for the super
    /// transaction.
    fn is_committed(&self, xid: Xid) -> TxnResult<bool> {
        if xid.is_super() {
            return Ok(true);
        }
        Ok(self.status(xid)? == XidStatus::Committed)
    }

    /// Returns true if the transaction aborted.
    fn is_aborted(&self, xid: Xid) -> TxnResult<bool> {
        if xid.is_super() {
            return Ok(false);
        }
        Ok(self.status(xid)? == XidStatus::Aborted)
    }
}

struct XidFile {
    file: File,
    /// Last allocated id.
    counter: u64,
}

impl XidFile {
    fn position(xid: Xid) -> u64 {
        HEADER_SIZE + (xid.as_u64() - 1)
    }

    fn write_status(&mut self, xid: Xid, status: XidStatus) -> TxnResult<()> {
        self.file.seek(SeekFrom::Start(Self::position(xid)))?;
        self.file.write_all(&[status as u8])?;
        self.file.sync_all()?;
        Ok(())
    }

    fn write_counter(&mut self, counter: u64) -> TxnResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&counter.to_be_bytes())?;
        self.file.sync_all()?;
        self.counter = counter;
        Ok(())
    }

    fn check_allocated(&self, xid: Xid) -> TxnResult<()> {
        if xid.is_super() || xid.as_u64() > self.counter {
            return Err(TxnError::UnknownXid { xid });
        }
        Ok(())
    }
}

/// The transaction status file.
pub struct TransactionManager {
    path: PathBuf,
    inner: Mutex<XidFile>,
}

impl TransactionManager {
    /// Creates a new status file. Fails if the file exists.
    pub fn create(path: impl AsRef<Path>) -> TxnResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut inner = XidFile { file, counter: 0 };
        inner.write_counter(0)?;
        debug!(path = %path.display(), "created transaction file");

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Opens an existing status file and validates its length.
    pub fn open(path: impl AsRef<Path>) -> TxnResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let len = file.metadata()?.len();
        if len < HEADER_SIZE {
            error!(path = %path.display(), len, "transaction file too short");
            return Err(TxnError::bad_xid_file(format!(
                "file is {} bytes, shorter than its header",
                len
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let counter = u64::from_be_bytes(header);
        if HEADER_SIZE.checked_add(counter) != Some(len) {
            error!(path = %path.display(), len, counter, "transaction file length mismatch");
            return Err(TxnError::bad_xid_file(format!(
                "file is {} bytes but counter is {}",
                len, counter
            )));
        }

        debug!(path = %path.display(), counter, "opened transaction file");
        Ok(Self {
            path,
            inner: Mutex::new(XidFile { file, counter }),
        })
    }

    /// Last allocated transaction id.
    pub fn last_xid(&self) -> Xid {
        Xid::new(self.inner.lock().counter)
    }

    /// Path of the status file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the file.
    pub fn close(&self) -> TxnResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn set_status(&self, xid: Xid, status: XidStatus) -> TxnResult<()> {
        let mut inner = self.inner.lock();
        inner.check_allocated(xid)?;
        inner.write_status(xid, status)
    }
}

impl TransactionOracle for TransactionManager {
    fn begin(&self) -> TxnResult<Xid> {
        let mut inner = self.inner.lock();
        let xid = Xid::new(inner.counter + 1);
        inner.write_status(xid, XidStatus::Active)?;
        inner.write_counter(xid.as_u64())?;
        Ok(xid)
    }

    fn commit(&self, xid: Xid) -> TxnResult<()> {
        self.set_status(xid, XidStatus::Committed)
    }

    fn abort(&self, xid: Xid) -> TxnResult<()> {
        self.set_status(xid, XidStatus::Aborted)
    }

    fn status(&self, xid: Xid) -> TxnResult<XidStatus> {
        if xid.is_super() {
            return Ok(XidStatus::Committed);
        }

        let mut inner = self.inner.lock();
        inner.check_allocated(xid)?;
        let mut byte = [0u8; 1];
        inner.file.seek(SeekFrom::Start(XidFile::position(xid)))?;
        inner.file.read_exact(&mut byte)?;
        XidStatus::from_byte(byte[0]).ok_or_else(|| {
            TxnError::bad_xid_file(format!("transaction {} has status byte {}", xid, byte[0]))
        })
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("path", &self.path)
            .field("last_xid", &self.last_xid())
            .finish()
    }
}
