//! The data manager.
//!
//! Owns the page cache, the log and the free-space index, and hands out
//! reference-counted [`DataItem`]s. Every insert is logged before the page
//! is touched; every in-place update goes through
//! [`DataItem::before`].

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use strata_cache::{CacheSource, CacheStats, RefCountCache};
use strata_common::config::EngineConfig;
use strata_common::constants::{INSERT_RETRIES, MAX_FREE_SPACE};
use strata_common::types::{PageNo, Uid, Xid};
use strata_txn::TransactionOracle;
use strata_wal::{LogRecord, Logger};

use crate::cache::PageCache;
use crate::error::{StorageError, StorageResult};
use crate::index::{PageIndex, PageInfo};
use crate::item::DataItem;
use crate::page::{CheckpointPage, DataPage, Page};
use crate::recovery;

/// Loads data items from pinned pages.
struct ItemSource {
    pages: Arc<PageCache>,
    logger: Arc<Logger>,
}

impl CacheSource for ItemSource {
    type Item = DataItem;
    type Error = StorageError;

    fn fetch(&self, key: u64) -> StorageResult<DataItem> {
        let uid = Uid::new(key);
        let page = self.pages.get_page(uid.page_no())?;
        match DataItem::load(uid, Arc::clone(&page), Arc::clone(&self.logger)) {
            Ok(item) => Ok(item),
            Err(err) => {
                self.pages.release(&page)?;
                Err(err)
            }
        }
    }

    fn evict(&self, _key: u64, item: &DataItem) -> StorageResult<()> {
        self.pages.release(item.page())
    }
}

/// The data manager.
pub struct DataManager {
    pages: Arc<PageCache>,
    logger: Arc<Logger>,
    page_index: PageIndex,
    items: RefCountCache<ItemSource>,
    /// Pinned checkpoint page; `None` once closed.
    checkpoint: Mutex<Option<Arc<Page>>>,
}

impl DataManager {
    /// Creates the page file and the log of a new database.
    pub fn create(config: &EngineConfig) -> StorageResult<Self> {
        let pages = Arc::new(PageCache::create(config.db_path(), &config.page_cache)?);
        let logger = Arc::new(Logger::create(config.log_path())?);

        let page_no = pages.new_page(&CheckpointPage::init_raw())?;
        debug_assert_eq!(page_no, PageNo::CHECKPOINT);
        let checkpoint = pages.get_page(PageNo::CHECKPOINT)?;

        info!(path = %config.path.display(), "created data manager");
        Ok(Self::assemble(pages, logger, checkpoint))
    }

    /// Opens an existing database, recovering it first if the previous
    /// shutdown was not clean.
    pub fn open(config: &EngineConfig, tm: &dyn TransactionOracle) -> StorageResult<Self> {
        let pages = Arc::new(PageCache::open(config.db_path(), &config.page_cache)?);
        let logger = Arc::new(Logger::open(config.log_path())?);

        let checkpoint = pages.get_page(PageNo::CHECKPOINT)?;
        if !CheckpointPage::is_valid(&checkpoint) {
            warn!(path = %config.path.display(), "unclean shutdown detected");
            recovery::recover(tm, &logger, &pages)?;
        }

        let dm = Self::assemble(pages, logger, Arc::clone(&checkpoint));
        dm.fill_page_index()?;

        CheckpointPage::set_open(&checkpoint);
        dm.pages.flush_page(&checkpoint)?;

        info!(
            path = %config.path.display(),
            page_count = dm.pages.page_count(),
            "opened data manager"
        );
        Ok(dm)
    }

    fn assemble(pages: Arc<PageCache>, logger: Arc<Logger>, checkpoint: Arc<Page>) -> Self {
        let source = ItemSource {
            pages: Arc::clone(&pages),
            logger: Arc::clone(&logger),
        };
        Self {
            pages,
            logger,
            page_index: PageIndex::new(),
            items: RefCountCache::new(source, 0),
            checkpoint: Mutex::new(Some(checkpoint)),
        }
    }

    fn fill_page_index(&self) -> StorageResult<()> {
        for n in 2..=self.pages.page_count() {
            let page = self.pages.get_page(PageNo::new(n))?;
            let free_space = DataPage::free_space(&page);
            self.pages.release(&page)?;
            self.page_index.add(page.page_no(), free_space);
        }
        debug!(pages = self.page_index.len(), "page index filled");
        Ok(())
    }

    /// Reads the item at `uid`. Returns `None` if it has been deleted.
    ///
    /// A returned item must be handed back with [`release`](Self::release).
    pub fn read(&self, uid: Uid) -> StorageResult<Option<Arc<DataItem>>> {
        let item = self.items.get(uid.as_u64())?;
        if !item.is_valid() {
            self.items.release(uid.as_u64())?;
            return Ok(None);
        }
        Ok(Some(item))
    }

    /// Inserts `data` on behalf of `xid` and returns its uid.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> StorageResult<Uid> {
        let raw = Bytes::from(DataItem::wrap_raw(data));
        if raw.len() > MAX_FREE_SPACE {
            return Err(StorageError::DataTooLarge {
                size: raw.len(),
                max_size: MAX_FREE_SPACE,
            });
        }

        for _ in 0..INSERT_RETRIES {
            let Some(info) = self.page_index.select(raw.len()) else {
                let page_no = self.pages.new_page(&DataPage::init_raw())?;
                self.page_index.add(page_no, MAX_FREE_SPACE);
                continue;
            };
            if let Some(offset) = self.insert_into(xid, info, &raw)? {
                return Ok(Uid::from_parts(info.page_no, offset));
            }
        }
        Err(StorageError::DatabaseBusy { size: raw.len() })
    }

    /// Writes `raw` into the selected page. Returns `None`, with nothing
    /// logged, if the page turned out to be too full.
    fn insert_into(&self, xid: Xid, info: PageInfo, raw: &Bytes) -> StorageResult<Option<u16>> {
        let page = match self.pages.get_page(info.page_no) {
            Ok(page) => page,
            Err(err) => {
                self.page_index.add(info.page_no, info.free_space);
                return Err(err);
            }
        };

        let written = DataPage::insert_logged(&page, raw, |offset| {
            let record = LogRecord::Insert {
                xid,
                page_no: page.page_no(),
                offset,
                raw: raw.clone(),
            };
            Ok(self.logger.log(&record.encode())?)
        });

        let free_space = DataPage::free_space(&page);
        let released = self.pages.release(&page);
        self.page_index.add(info.page_no, free_space);

        let offset = written?;
        released?;
        if offset.is_none() {
            debug!(page_no = %info.page_no, size = raw.len(), "selected page too full, retrying");
        }
        Ok(offset)
    }

    /// Releases an item obtained from [`read`](Self::read).
    pub fn release(&self, item: &DataItem) -> StorageResult<()> {
        self.items.release(item.uid().as_u64())
    }

    /// The log.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// Number of pages in the page file.
    pub fn page_count(&self) -> u32 {
        self.pages.page_count()
    }

    /// Page cache statistics.
    pub fn page_stats(&self) -> &CacheStats {
        self.pages.stats()
    }

    /// Data item cache statistics.
    pub fn item_stats(&self) -> &CacheStats {
        self.items.stats()
    }

    /// Writes everything back and marks the shutdown clean. Closing twice
    /// is a no-op.
    pub fn close(&self) -> StorageResult<()> {
        let Some(checkpoint) = self.checkpoint.lock().take() else {
            return Ok(());
        };

        self.items.close()?;
        CheckpointPage::set_close(&checkpoint);
        self.pages.flush_page(&checkpoint)?;
        self.pages.release(&checkpoint)?;
        self.pages.close()?;
        self.logger.close()?;
        info!(log = %self.logger.path().display(), "closed data manager");
        Ok(())
    }
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("pages", &self.pages)
            .field("page_index", &self.page_index)
            .finish()
    }
}
