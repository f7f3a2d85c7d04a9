//! Data page layout.

use strata_common::constants::{FREE_SPACE_OFFSET_SIZE, PAGE_SIZE};

use super::Page;
use crate::error::{StorageError, StorageResult};

/// Layout of a data page: a 2-byte free space offset (FSO) followed by
/// items appended one after another. Items are never moved or compacted.
pub struct DataPage;

impl DataPage {
    /// Offset of the FSO field.
    pub const FSO_OFFSET: usize = 0;
    /// Offset of the first item.
    pub const DATA_OFFSET: usize = FREE_SPACE_OFFSET_SIZE;

    /// Bytes of a freshly allocated data page.
    pub fn init_raw() -> Vec<u8> {
        let mut raw = vec![0u8; PAGE_SIZE];
        Self::set_fso(&mut raw, Self::DATA_OFFSET as u16);
        raw
    }

    /// Reads the FSO from page bytes.
    pub fn fso(raw: &[u8]) -> u16 {
        u16::from_be_bytes([raw[Self::FSO_OFFSET], raw[Self::FSO_OFFSET + 1]])
    }

    fn set_fso(raw: &mut [u8], fso: u16) {
        raw[Self::FSO_OFFSET..Self::FSO_OFFSET + 2].copy_from_slice(&fso.to_be_bytes());
    }

    /// Free bytes left on the page.
    pub fn free_space(page: &Page) -> usize {
        let fso = (Self::fso(&page.lock()) as usize).max(Self::DATA_OFFSET);
        PAGE_SIZE.saturating_sub(fso)
    }

    /// Appends `raw` at the FSO and returns the offset it was written at.
    pub fn insert(page: &Page, raw: &[u8]) -> StorageResult<u16> {
        Self::insert_logged(page, raw, |_| Ok(()))?.ok_or_else(|| {
            StorageError::corrupt_page(
                page.page_no(),
                format!("insert of {} bytes overflows page", raw.len()),
            )
        })
    }

    /// Appends `raw` at the FSO, calling `log` with the target offset first.
    ///
    /// Returns `Ok(None)` without calling `log` if `raw` does not fit. The
    /// page stays locked from the fit check until the bytes are written.
    pub fn insert_logged<F>(page: &Page, raw: &[u8], log: F) -> StorageResult<Option<u16>>
    where
        F: FnOnce(u16) -> StorageResult<()>,
    {
        let mut data = page.lock();
        let offset = (Self::fso(&data) as usize).max(Self::DATA_OFFSET);
        let end = offset + raw.len();
        if end > PAGE_SIZE {
            return Ok(None);
        }

        log(offset as u16)?;
        page.set_dirty(true);
        data[offset..end].copy_from_slice(raw);
        Self::set_fso(&mut data, end as u16);
        Ok(Some(offset as u16))
    }

    /// Writes `raw` at `offset` during recovery and moves the FSO past it if
    /// needed.
    pub fn recover_insert(page: &Page, raw: &[u8], offset: u16) -> StorageResult<()> {
        let mut data = page.lock();
        let end = Self::checked_end(page, raw, offset)?;

        page.set_dirty(true);
        data[offset as usize..end].copy_from_slice(raw);
        if (Self::fso(&data) as usize) < end {
            Self::set_fso(&mut data, end as u16);
        }
        Ok(())
    }

    /// Writes `raw` at `offset` during recovery, leaving the FSO alone.
    pub fn recover_update(page: &Page, raw: &[u8], offset: u16) -> StorageResult<()> {
        let mut data = page.lock();
        let end = Self::checked_end(page, raw, offset)?;

        page.set_dirty(true);
        data[offset as usize..end].copy_from_slice(raw);
        Ok(())
    }

    fn checked_end(page: &Page, raw: &[u8], offset: u16) -> StorageResult<usize> {
        let end = offset as usize + raw.len();
        if (offset as usize) < Self::DATA_OFFSET || end > PAGE_SIZE {
            return Err(StorageError::corrupt_page(
                page.page_no(),
                format!("{} bytes at offset {} fall outside the page", raw.len(), offset),
            ));
        }
        Ok(end)
    }
}
