//! Reference-counted page cache.
//!
//! Pages are pinned with [`PageCache::get_page`] and unpinned with
//! [`PageCache::release`]. The last release writes a dirty page back to the
//! page file. New pages are written through immediately so the page count
//! on disk never lags behind the counter.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use strata_cache::{CacheSource, CacheStats, RefCountCache};
use strata_common::config::PageCacheConfig;
use strata_common::constants::{MIN_CACHE_PAGES, PAGE_SIZE};
use strata_common::types::PageNo;

use crate::error::{StorageError, StorageResult};
use crate::file::PageFile;
use crate::page::Page;

/// Loads pages from and writes them back to the page file.
struct PageSource {
    file: PageFile,
    /// Number of pages in the file. Page numbers are `1..=page_count`.
    page_count: AtomicU32,
}

impl CacheSource for PageSource {
    type Item = Page;
    type Error = StorageError;

    fn fetch(&self, key: u64) -> StorageResult<Page> {
        let page_no = PageNo::new(key as u32);
        let page_count = self.page_count.load(Ordering::Acquire);
        if !page_no.is_valid() || page_no.as_u32() > page_count {
            return Err(StorageError::PageOutOfRange {
                page_no,
                page_count,
            });
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.read_page(page_no, &mut buf)?;
        Ok(Page::new(page_no, buf))
    }

    fn evict(&self, _key: u64, page: &Page) -> StorageResult<()> {
        if page.is_dirty() {
            self.file.write_page(page.page_no(), &page.lock())?;
            page.set_dirty(false);
        }
        Ok(())
    }
}

/// The page cache.
pub struct PageCache {
    cache: RefCountCache<PageSource>,
}

impl PageCache {
    /// Creates a new page file at `path`.
    pub fn create(path: impl AsRef<Path>, config: &PageCacheConfig) -> StorageResult<Self> {
        let capacity = Self::checked_capacity(config)?;
        let file = PageFile::create(path)?;
        info!(path = ?file.path(), capacity, "created page file");
        Ok(Self::with_file(file, 0, capacity))
    }

    /// Opens an existing page file at `path`.
    pub fn open(path: impl AsRef<Path>, config: &PageCacheConfig) -> StorageResult<Self> {
        let capacity = Self::checked_capacity(config)?;
        let file = PageFile::open(path)?;
        let page_count = (file.len()? / PAGE_SIZE as u64) as u32;
        info!(path = ?file.path(), page_count, capacity, "opened page file");
        Ok(Self::with_file(file, page_count, capacity))
    }

    fn checked_capacity(config: &PageCacheConfig) -> StorageResult<usize> {
        let pages = config.capacity_pages();
        if pages < MIN_CACHE_PAGES {
            return Err(StorageError::CacheTooSmall {
                pages,
                min: MIN_CACHE_PAGES,
            });
        }
        Ok(pages)
    }

    fn with_file(file: PageFile, page_count: u32, capacity: usize) -> Self {
        let source = PageSource {
            file,
            page_count: AtomicU32::new(page_count),
        };
        Self {
            cache: RefCountCache::new(source, capacity),
        }
    }

    /// Allocates a page holding `init` and writes it to disk. The page is
    /// not pinned.
    pub fn new_page(&self, init: &[u8]) -> StorageResult<PageNo> {
        let source = self.cache.source();
        let page_no = PageNo::new(source.page_count.fetch_add(1, Ordering::AcqRel) + 1);
        source.file.write_page(page_no, init)?;
        debug!(%page_no, "allocated page");
        Ok(page_no)
    }

    /// Pins page `page_no`.
    pub fn get_page(&self, page_no: PageNo) -> StorageResult<Arc<Page>> {
        self.cache.get(page_no.as_u32() as u64)
    }

    /// Unpins a page obtained from [`get_page`](Self::get_page).
    pub fn release(&self, page: &Page) -> StorageResult<()> {
        self.cache.release(page.page_no().as_u32() as u64)
    }

    /// Writes a page to disk now, whether or not it is dirty.
    pub fn flush_page(&self, page: &Page) -> StorageResult<()> {
        self.cache.source().file.write_page(page.page_no(), &page.lock())?;
        page.set_dirty(false);
        Ok(())
    }

    /// Shrinks the page file to `max` pages. Only used by recovery, before
    /// any page is pinned.
    pub fn truncate(&self, max: PageNo) -> StorageResult<()> {
        let source = self.cache.source();
        source.file.set_page_count(max.as_u32())?;
        source.page_count.store(max.as_u32(), Ordering::Release);
        info!(page_count = max.as_u32(), "truncated page file");
        Ok(())
    }

    /// Number of pages in the file.
    pub fn page_count(&self) -> u32 {
        self.cache.source().page_count.load(Ordering::Acquire)
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// Writes back every resident page and syncs the file.
    pub fn close(&self) -> StorageResult<()> {
        self.cache.close()?;
        self.cache.source().file.sync()
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("file", &self.cache.source().file)
            .field("page_count", &self.page_count())
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(pages: usize) -> PageCacheConfig {
        PageCacheConfig {
            memory_bytes: pages * PAGE_SIZE,
        }
    }

    fn filled(byte: u8) -> Vec<u8> {
        vec![byte; PAGE_SIZE]
    }

    #[test]
    fn test_new_page_is_durable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.db");
        let cache = PageCache::create(&path, &config(16)).unwrap();

        assert_eq!(cache.new_page(&filled(1)).unwrap(), PageNo::new(1));
        assert_eq!(cache.new_page(&filled(2)).unwrap(), PageNo::new(2));
        assert_eq!(cache.page_count(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);

        let page = cache.get_page(PageNo::new(2)).unwrap();
        assert!(page.lock().iter().all(|&b| b == 2));
        cache.release(&page).unwrap();
    }

    #[test]
    fn test_dirty_page_written_back_on_last_release() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.db");
        let cache = PageCache::create(&path, &config(16)).unwrap();
        let page_no = cache.new_page(&filled(0)).unwrap();

        let a = cache.get_page(page_no).unwrap();
        let b = cache.get_page(page_no).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        a.lock()[0] = 42;
        a.set_dirty(true);
        cache.release(&a).unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[0], 0);

        cache.release(&b).unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[0], 42);
    }

    #[test]
    fn test_clean_page_not_written() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.db");
        let cache = PageCache::create(&path, &config(16)).unwrap();
        let page_no = cache.new_page(&filled(0)).unwrap();

        let page = cache.get_page(page_no).unwrap();
        page.lock()[0] = 7;
        cache.release(&page).unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[0], 0);
    }

    #[test]
    fn test_out_of_range_page() {
        let tmp = TempDir::new().unwrap();
        let cache = PageCache::create(tmp.path().join("t.db"), &config(16)).unwrap();
        cache.new_page(&filled(0)).unwrap();

        assert!(matches!(
            cache.get_page(PageNo::new(2)),
            Err(StorageError::PageOutOfRange { page_count: 1, .. })
        ));
        assert!(cache.get_page(PageNo::INVALID).is_err());
    }

    #[test]
    fn test_cache_too_small() {
        let tmp = TempDir::new().unwrap();
        let err = PageCache::create(tmp.path().join("t.db"), &config(MIN_CACHE_PAGES - 1))
            .unwrap_err();
        assert!(matches!(err, StorageError::CacheTooSmall { .. }));
    }

    #[test]
    fn test_cache_full_when_all_pinned() {
        let tmp = TempDir::new().unwrap();
        let cache = PageCache::create(tmp.path().join("t.db"), &config(MIN_CACHE_PAGES)).unwrap();
        for _ in 0..=MIN_CACHE_PAGES {
            cache.new_page(&filled(0)).unwrap();
        }

        let pinned: Vec<_> = (1..=MIN_CACHE_PAGES as u32)
            .map(|n| cache.get_page(PageNo::new(n)).unwrap())
            .collect();
        let err = cache.get_page(PageNo::new(MIN_CACHE_PAGES as u32 + 1)).unwrap_err();
        assert!(err.is_retryable());

        cache.release(&pinned[0]).unwrap();
        let page = cache.get_page(PageNo::new(MIN_CACHE_PAGES as u32 + 1)).unwrap();
        assert_eq!(page.page_no().as_u32(), MIN_CACHE_PAGES as u32 + 1);
    }

    #[test]
    fn test_reopen_and_truncate() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.db");
        {
            let cache = PageCache::create(&path, &config(16)).unwrap();
            for i in 0..5 {
                cache.new_page(&filled(i)).unwrap();
            }
            cache.close().unwrap();
        }

        let cache = PageCache::open(&path, &config(16)).unwrap();
        assert_eq!(cache.page_count(), 5);
        cache.truncate(PageNo::new(3)).unwrap();
        assert_eq!(cache.page_count(), 3);
        assert!(cache.get_page(PageNo::new(4)).is_err());
        assert_eq!(cache.new_page(&filled(9)).unwrap(), PageNo::new(4));
    }

    #[test]
    fn test_close_flushes_pinned_pages() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("t.db");
        let cache = PageCache::create(&path, &config(16)).unwrap();
        let page_no = cache.new_page(&filled(0)).unwrap();

        let page = cache.get_page(page_no).unwrap();
        page.lock()[10] = 3;
        page.set_dirty(true);
        cache.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[10], 3);
    }
}
