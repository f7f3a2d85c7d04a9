//! Free-space index.
//!
//! Pages are grouped into buckets of `PAGE_SIZE / 40` bytes of free space.
//! `select` starts one bucket above the request so any page it returns has
//! at least the requested space. The top bucket is open-ended, so there
//! the recorded free space is compared with the request. Entries are
//! consumed by `select`; the caller re-adds the page once it knows the new
//! free space.

use std::collections::VecDeque;

use parking_lot::Mutex;

use strata_common::constants::{PAGE_INDEX_INTERVALS, PAGE_SIZE};
use strata_common::types::PageNo;

/// Width of one bucket in bytes.
const THRESHOLD: usize = PAGE_SIZE / PAGE_INDEX_INTERVALS;

/// A page and its free space at the time it was indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    /// The page.
    pub page_no: PageNo,
    /// Free bytes on the page.
    pub free_space: usize,
}

/// Bucketed index of pages by free space.
pub struct PageIndex {
    buckets: Mutex<Vec<VecDeque<PageInfo>>>,
}

impl PageIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(vec![VecDeque::new(); PAGE_INDEX_INTERVALS + 1]),
        }
    }

    fn bucket_of(space: usize) -> usize {
        (space / THRESHOLD).min(PAGE_INDEX_INTERVALS)
    }

    /// Registers `page_no` with `free_space` free bytes.
    pub fn add(&self, page_no: PageNo, free_space: usize) {
        let bucket = Self::bucket_of(free_space);
        self.buckets.lock()[bucket].push_back(PageInfo {
            page_no,
            free_space,
        });
    }

    /// Removes and returns a page with at least `required` free bytes, or
    /// `None` if no indexed page qualifies.
    pub fn select(&self, required: usize) -> Option<PageInfo> {
        let mut bucket = Self::bucket_of(required);
        if bucket < PAGE_INDEX_INTERVALS {
            bucket += 1;
        }

        let mut buckets = self.buckets.lock();
        buckets[bucket..].iter_mut().find_map(|entries| {
            let at = entries
                .iter()
                .position(|info| info.free_space >= required)?;
            entries.remove(at)
        })
    }

    /// Number of indexed pages.
    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(VecDeque::len).sum()
    }

    /// Returns true if no page is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PageIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageIndex").field("pages", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::constants::MAX_FREE_SPACE;

    #[test]
    fn test_select_consumes() {
        let index = PageIndex::new();
        index.add(PageNo::new(2), MAX_FREE_SPACE);

        let info = index.select(100).unwrap();
        assert_eq!(info.page_no, PageNo::new(2));
        assert_eq!(info.free_space, MAX_FREE_SPACE);
        assert!(index.select(100).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_select_never_returns_too_small_page() {
        let index = PageIndex::new();
        // Same bucket as the request: may be smaller than required.
        index.add(PageNo::new(2), THRESHOLD + 10);
        assert!(index.select(THRESHOLD + 50).is_none());

        index.add(PageNo::new(3), 2 * THRESHOLD);
        assert_eq!(index.select(THRESHOLD + 50).unwrap().page_no, PageNo::new(3));
    }

    #[test]
    fn test_select_smallest_qualifying_bucket_first() {
        let index = PageIndex::new();
        index.add(PageNo::new(2), MAX_FREE_SPACE);
        index.add(PageNo::new(3), 3 * THRESHOLD);

        assert_eq!(index.select(10).unwrap().page_no, PageNo::new(3));
        assert_eq!(index.select(10).unwrap().page_no, PageNo::new(2));
    }

    #[test]
    fn test_fifo_within_bucket() {
        let index = PageIndex::new();
        index.add(PageNo::new(4), 1000);
        index.add(PageNo::new(5), 1000);
        assert_eq!(index.len(), 2);
        assert_eq!(index.select(10).unwrap().page_no, PageNo::new(4));
        assert_eq!(index.select(10).unwrap().page_no, PageNo::new(5));
    }

    #[test]
    fn test_top_bucket_checks_free_space() {
        let index = PageIndex::new();
        let request = MAX_FREE_SPACE - 20;
        index.add(PageNo::new(2), MAX_FREE_SPACE - 25);
        assert_eq!(PageIndex::bucket_of(request), PAGE_INDEX_INTERVALS);
        assert_eq!(PageIndex::bucket_of(MAX_FREE_SPACE - 25), PAGE_INDEX_INTERVALS);

        assert!(index.select(request).is_none());
        assert_eq!(index.len(), 1);

        index.add(PageNo::new(3), MAX_FREE_SPACE);
        assert_eq!(index.select(request).unwrap().page_no, PageNo::new(3));
        assert_eq!(index.select(10).unwrap().page_no, PageNo::new(2));
    }

    #[test]
    fn test_full_page_request() {
        let index = PageIndex::new();
        index.add(PageNo::new(2), MAX_FREE_SPACE);
        assert!(index.select(MAX_FREE_SPACE).is_some());
    }
}
