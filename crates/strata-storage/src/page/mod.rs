//! In-memory pages and page layouts.
//!
//! Every page is `PAGE_SIZE` bytes. Page 1 is the checkpoint page, every
//! other page is a data page:
//!
//! ```text
//! Data page:
//! +-------------------------+---------------------------------+
//! | FreeSpaceOffset (2)     | items ...          | free ...   |
//! +-------------------------+---------------------------------+
//!
//! Checkpoint page:
//! +-----------+------------------+-------------------+--------+
//! | 0..100    | open marker (8)  | close marker (8)  | ...    |
//! +-----------+------------------+-------------------+--------+
//! ```

mod checkpoint;
mod data;

pub use checkpoint::CheckpointPage;
pub use data::DataPage;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use strata_common::constants::PAGE_SIZE;
use strata_common::types::PageNo;

/// A resident page.
///
/// The bytes are guarded by a mutex; the dirty flag tells the page cache
/// whether the page must be written back on eviction.
pub struct Page {
    page_no: PageNo,
    data: Mutex<Box<[u8]>>,
    dirty: AtomicBool,
}

impl Page {
    /// Wraps `data` as page `page_no`. `data` must be `PAGE_SIZE` bytes.
    pub fn new(page_no: PageNo, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self {
            page_no,
            data: Mutex::new(data.into_boxed_slice()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Returns the page number.
    #[inline]
    pub fn page_no(&self) -> PageNo {
        self.page_no
    }

    /// Locks the page bytes.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.data.lock()
    }

    /// Returns true if the page changed since it was last written.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Copies the page bytes.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().to_vec()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_no", &self.page_no)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
