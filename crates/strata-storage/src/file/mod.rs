//! Page file I/O.
//!
//! The page file is a plain concatenation of `PAGE_SIZE` pages. Page `n`
//! (1-based) starts at byte `(n - 1) * PAGE_SIZE`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use strata_common::constants::PAGE_SIZE;
use strata_common::types::PageNo;

use crate::error::StorageResult;

/// The backing file of the page cache.
///
/// All access is positional and serialized by one mutex.
pub struct PageFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl PageFile {
    /// Creates a new, empty page file. Fails if the file exists.
    pub fn create(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Opens an existing page file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Reads one page into `buf`.
    pub fn read_page(&self, page_no: PageNo, buf: &mut [u8]) -> StorageResult<()> {
        debug_assert_eq!(buf.len(), PAGE_SIZE);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_no.file_offset(PAGE_SIZE)))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Writes one page and forces it to disk.
    pub fn write_page(&self, page_no: PageNo, data: &[u8]) -> StorageResult<()> {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_no.file_offset(PAGE_SIZE)))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Current length in bytes.
    pub fn len(&self) -> StorageResult<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Returns true if the file holds no bytes.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Shrinks or extends the file to exactly `page_count` pages.
    pub fn set_page_count(&self, page_count: u32) -> StorageResult<()> {
        let file = self.file.lock();
        file.set_len(page_count as u64 * PAGE_SIZE as u64)?;
        file.sync_all()?;
        Ok(())
    }

    /// Forces buffered writes to disk.
    pub fn sync(&self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for PageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFile").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pages_land_at_their_offsets() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("p.db");
        let file = PageFile::create(&path).unwrap();

        file.write_page(PageNo::new(2), &vec![2u8; PAGE_SIZE]).unwrap();
        file.write_page(PageNo::new(1), &vec![1u8; PAGE_SIZE]).unwrap();
        assert_eq!(file.len().unwrap(), 2 * PAGE_SIZE as u64);

        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_page(PageNo::new(2), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 2));

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw[0], 1);
        assert_eq!(raw[PAGE_SIZE], 2);
    }

    #[test]
    fn test_set_page_count() {
        let tmp = TempDir::new().unwrap();
        let file = PageFile::create(tmp.path().join("p.db")).unwrap();
        for i in 1..=4 {
            file.write_page(PageNo::new(i), &vec![0u8; PAGE_SIZE]).unwrap();
        }

        file.set_page_count(2).unwrap();
        assert_eq!(file.len().unwrap(), 2 * PAGE_SIZE as u64);

        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(file.read_page(PageNo::new(3), &mut buf).is_err());
    }
}
