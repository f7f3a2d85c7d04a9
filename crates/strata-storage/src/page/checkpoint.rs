//! Checkpoint page layout.
//!
//! Page 1 carries two 8-byte markers. Opening the database writes fresh
//! random bytes into the open marker; a clean close copies them into the
//! close marker. Equal markers mean the previous shutdown was clean.

use rand::Rng;

use strata_common::constants::{CHECKPOINT_LEN, CHECKPOINT_OFFSET, PAGE_SIZE};

use super::Page;

/// Layout of the checkpoint page.
pub struct CheckpointPage;

impl CheckpointPage {
    /// Offset of the open marker.
    pub const OPEN_OFFSET: usize = CHECKPOINT_OFFSET;
    /// Offset of the close marker.
    pub const CLOSE_OFFSET: usize = CHECKPOINT_OFFSET + CHECKPOINT_LEN;

    /// Bytes of a new checkpoint page, with a fresh open marker.
    pub fn init_raw() -> Vec<u8> {
        let mut raw = vec![0u8; PAGE_SIZE];
        Self::write_open_marker(&mut raw);
        raw
    }

    fn write_open_marker(raw: &mut [u8]) {
        rand::thread_rng().fill(&mut raw[Self::OPEN_OFFSET..Self::OPEN_OFFSET + CHECKPOINT_LEN]);
    }

    /// Writes a fresh open marker.
    pub fn set_open(page: &Page) {
        page.set_dirty(true);
        Self::write_open_marker(&mut page.lock());
    }

    /// Copies the open marker into the close marker.
    pub fn set_close(page: &Page) {
        page.set_dirty(true);
        let mut raw = page.lock();
        raw.copy_within(
            Self::OPEN_OFFSET..Self::OPEN_OFFSET + CHECKPOINT_LEN,
            Self::CLOSE_OFFSET,
        );
    }

    /// Returns true if the markers match.
    pub fn is_valid(page: &Page) -> bool {
        Self::check_raw(&page.lock())
    }

    /// Returns true if the markers in `raw` match.
    pub fn check_raw(raw: &[u8]) -> bool {
        raw[Self::OPEN_OFFSET..Self::OPEN_OFFSET + CHECKPOINT_LEN]
            == raw[Self::CLOSE_OFFSET..Self::CLOSE_OFFSET + CHECKPOINT_LEN]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_common::types::PageNo;

    #[test]
    fn test_markers() {
        let page = Page::new(PageNo::CHECKPOINT, CheckpointPage::init_raw());
        assert!(!CheckpointPage::is_valid(&page));

        CheckpointPage::set_close(&page);
        assert!(CheckpointPage::is_valid(&page));
        assert!(page.is_dirty());

        CheckpointPage::set_open(&page);
        assert!(!CheckpointPage::is_valid(&page));
    }
}
