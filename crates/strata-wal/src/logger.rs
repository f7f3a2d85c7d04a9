//! Append-only checksummed log file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{WalError, WalResult};

/// Size of the file-level checksum at the start of the file.
const X_CHECKSUM_SIZE: u64 = 4;

/// Size of the `[size][checksum]` header of every record.
const RECORD_HEADER_SIZE: usize = 8;

/// Log statistics.
#[derive(Debug, Default)]
pub struct LogStats {
    /// Records appended since open.
    pub records_appended: AtomicU64,
    /// Bytes appended since open, headers included.
    pub bytes_appended: AtomicU64,
    /// Bytes discarded as bad tail on open.
    pub bytes_truncated: AtomicU64,
}

/// State guarded by the logger mutex.
struct LoggerInner {
    file: File,
    /// Running checksum over all records, as stored at offset 0.
    x_checksum: u32,
    /// Length of the well-formed region of the file.
    file_len: u64,
    /// Read cursor of `next`.
    position: u64,
}

/// A record read back from the file, with its full on-disk encoding.
struct WrappedRecord {
    wrapped: Vec<u8>,
}

impl WrappedRecord {
    fn data(&self) -> &[u8] {
        &self.wrapped[RECORD_HEADER_SIZE..]
    }
}

impl LoggerInner {
    /// Reads the record at the cursor, or `None` at the end of the
    /// well-formed region.
    fn next_wrapped(&mut self) -> WalResult<Option<WrappedRecord>> {
        if self.position + RECORD_HEADER_SIZE as u64 > self.file_len {
            return Ok(None);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.read_exact(&mut header)?;
        let size = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let checksum = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        let end = self.position + RECORD_HEADER_SIZE as u64 + size;
        if end > self.file_len {
            return Ok(None);
        }

        let mut wrapped = vec![0u8; RECORD_HEADER_SIZE + size as usize];
        wrapped[..RECORD_HEADER_SIZE].copy_from_slice(&header);
        self.file.read_exact(&mut wrapped[RECORD_HEADER_SIZE..])?;

        if crc32fast::hash(&wrapped[RECORD_HEADER_SIZE..]) != checksum {
            return Ok(None);
        }

        self.position = end;
        Ok(Some(WrappedRecord { wrapped }))
    }

    fn write_x_checksum(&mut self, x_checksum: u32) -> WalResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&x_checksum.to_be_bytes())?;
        self.file.sync_all()?;
        self.x_checksum = x_checksum;
        Ok(())
    }
}

/// Extends a running checksum with one more wrapped record.
fn chain_checksum(prev: u32, wrapped: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(prev);
    hasher.update(wrapped);
    hasher.finalize()
}

/// Wraps data as `[size][checksum][data]`.
fn wrap(data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + data.len());
    buf.put_u32(data.len() as u32);
    buf.put_u32(crc32fast::hash(data));
    buf.put_slice(data);
    buf.freeze()
}

/// The write-ahead log.
///
/// `log` is serialized by a mutex and returns only once the record and the
/// updated file checksum are on disk. `next`/`rewind` iterate the records
/// from the start and are meant for recovery, before concurrent writers
/// exist.
pub struct Logger {
    path: PathBuf,
    inner: Mutex<LoggerInner>,
    stats: LogStats,
}

impl Logger {
    /// Creates a new, empty log. Fails if the file exists.
    pub fn create(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        let mut inner = LoggerInner {
            file,
            x_checksum: 0,
            file_len: X_CHECKSUM_SIZE,
            position: X_CHECKSUM_SIZE,
        };
        inner.write_x_checksum(0)?;
        debug!(path = %path.display(), "created log");

        Ok(Self {
            path,
            inner: Mutex::new(inner),
            stats: LogStats::default(),
        })
    }

    /// Opens an existing log, discarding any bad tail.
    ///
    /// The stored checksum is compared with the checksum of every
    /// well-formed record prefix:
    ///
    /// 1. It matches all well-formed records: trailing garbage is cut off.
    /// 2. It matches a shorter prefix: the records after it were never
    ///    acknowledged and are cut off with the garbage.
    /// 3. It matches no prefix but bytes follow the last well-formed record:
    ///    a crash interrupted a write. The tail is cut off and the header is
    ///    rewritten.
    /// 4. Otherwise the header itself is corrupt and the log is refused.
    pub fn open(path: impl AsRef<Path>) -> WalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len < X_CHECKSUM_SIZE {
            return Err(WalError::corrupted(format!(
                "log file is {} bytes, too short for its header",
                len
            )));
        }

        let mut inner = LoggerInner {
            file,
            x_checksum: 0,
            file_len: len,
            position: X_CHECKSUM_SIZE,
        };
        let mut header = [0u8; X_CHECKSUM_SIZE as usize];
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.read_exact(&mut header)?;
        let stored = u32::from_be_bytes(header);
        inner.x_checksum = stored;

        let logger = Self {
            path,
            inner: Mutex::new(inner),
            stats: LogStats::default(),
        };
        logger.remove_bad_tail()?;
        Ok(logger)
    }

    fn remove_bad_tail(&self) -> WalResult<()> {
        let mut inner = self.inner.lock();
        let stored = inner.x_checksum;

        // (end position, running checksum) after each well-formed record.
        let mut prefixes = vec![(X_CHECKSUM_SIZE, 0u32)];
        let mut running = 0u32;
        inner.position = X_CHECKSUM_SIZE;
        while let Some(record) = inner.next_wrapped()? {
            running = chain_checksum(running, &record.wrapped);
            prefixes.push((inner.position, running));
        }
        let good_end = inner.position;

        let keep = if running == stored {
            good_end
        } else if let Some(&(end, _)) = prefixes.iter().rev().find(|(_, sum)| *sum == stored) {
            warn!(
                path = %self.path.display(),
                dropped_bytes = good_end - end,
                "log contains records past its checksum, dropping them"
            );
            end
        } else if good_end < inner.file_len {
            warn!(
                path = %self.path.display(),
                "log checksum mismatch with interrupted tail, rewriting header"
            );
            inner.write_x_checksum(running)?;
            good_end
        } else {
            return Err(WalError::corrupted(format!(
                "log checksum {:#010x} matches no record prefix (computed {:#010x})",
                stored, running
            )));
        };

        if keep < inner.file_len {
            let dropped = inner.file_len - keep;
            self.stats.bytes_truncated.fetch_add(dropped, Ordering::Relaxed);
            info!(path = %self.path.display(), dropped_bytes = dropped, "truncated bad log tail");
            inner.file.set_len(keep)?;
            inner.file.sync_all()?;
            inner.file_len = keep;
        }
        inner.position = X_CHECKSUM_SIZE;
        Ok(())
    }

    /// Appends a record. Durable once this returns.
    pub fn log(&self, data: &[u8]) -> WalResult<()> {
        let wrapped = wrap(data);
        let mut inner = self.inner.lock();

        let end = inner.file_len;
        inner.file.seek(SeekFrom::Start(end))?;
        inner.file.write_all(&wrapped)?;
        inner.file.sync_all()?;
        inner.file_len = end + wrapped.len() as u64;

        let x_checksum = chain_checksum(inner.x_checksum, &wrapped);
        inner.write_x_checksum(x_checksum)?;

        self.stats.records_appended.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_appended
            .fetch_add(wrapped.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the data of the next record, or `None` at the end of the log.
    pub fn next(&self) -> WalResult<Option<Bytes>> {
        let mut inner = self.inner.lock();
        Ok(inner
            .next_wrapped()?
            .map(|record| Bytes::copy_from_slice(record.data())))
    }

    /// Moves the read cursor back to the first record.
    pub fn rewind(&self) {
        self.inner.lock().position = X_CHECKSUM_SIZE;
    }

    /// Reads every record from the start, leaving the cursor rewound.
    pub fn records(&self) -> WalResult<Vec<Bytes>> {
        self.rewind();
        let mut records = Vec::new();
        while let Some(data) = self.next()? {
            records.push(data);
        }
        self.rewind();
        Ok(records)
    }

    /// Current length of the log file.
    pub fn len(&self) -> u64 {
        self.inner.lock().file_len
    }

    /// Returns true if the log holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == X_CHECKSUM_SIZE
    }

    /// Returns the log statistics.
    pub fn stats(&self) -> &LogStats {
        &self.stats
    }

    /// Returns the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the file. Every `log` is already durable.
    pub fn close(&self) -> WalResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Logger")
            .field("path", &self.path)
            .field("file_len", &inner.file_len)
            .field("x_checksum", &format_args!("{:#010x}", inner.x_checksum))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn payloads() -> Vec<Vec<u8>> {
        vec![
            b"first".to_vec(),
            Vec::new(),
            vec![0xAB; 300],
            b"fourth record".to_vec(),
        ]
    }

    fn write_log(path: &Path, records: &[Vec<u8>]) {
        let logger = Logger::create(path).unwrap();
        for record in records {
            logger.log(record).unwrap();
        }
        logger.close().unwrap();
    }

    #[test]
    fn test_create_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        let logger = Logger::create(&path).unwrap();

        assert!(logger.is_empty());
        assert!(logger.next().unwrap().is_none());
        assert_eq!(std::fs::read(&path).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_create_refuses_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        Logger::create(&path).unwrap();
        assert!(Logger::create(&path).is_err());
    }

    #[test]
    fn test_log_roundtrip_after_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        write_log(&path, &payloads());

        let logger = Logger::open(&path).unwrap();
        let records = logger.records().unwrap();
        let expected: Vec<Bytes> = payloads().into_iter().map(Bytes::from).collect();
        assert_eq!(records, expected);
        assert_eq!(logger.stats().bytes_truncated.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_next_and_rewind() {
        let tmp = TempDir::new().unwrap();
        let logger = Logger::create(tmp.path().join("a.log")).unwrap();
        logger.log(b"one").unwrap();
        logger.log(b"two").unwrap();

        assert_eq!(logger.next().unwrap().unwrap().as_ref(), b"one");
        assert_eq!(logger.next().unwrap().unwrap().as_ref(), b"two");
        assert!(logger.next().unwrap().is_none());

        logger.rewind();
        assert_eq!(logger.next().unwrap().unwrap().as_ref(), b"one");
    }

    #[test]
    fn test_bad_tail_truncated_at_every_offset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("full.log");
        let records = payloads();
        write_log(&path, &records);
        let full = std::fs::read(&path).unwrap();

        // Record boundaries, so every cut below lands mid-record.
        let mut boundaries = vec![4usize];
        for record in &records {
            let last = *boundaries.last().unwrap();
            boundaries.push(last + 8 + record.len());
        }

        for cut in 5..full.len() {
            if boundaries.contains(&cut) {
                continue;
            }
            let complete = boundaries.iter().filter(|&&b| b <= cut).count() - 1;

            let cut_path = tmp.path().join(format!("cut-{}.log", cut));
            std::fs::write(&cut_path, &full[..cut]).unwrap();

            let logger = Logger::open(&cut_path).unwrap();
            let read = logger.records().unwrap();
            assert_eq!(read.len(), complete, "cut at {}", cut);
            for (got, want) in read.iter().zip(&records) {
                assert_eq!(got.as_ref(), want.as_slice());
            }
            assert_eq!(logger.len(), boundaries[complete] as u64);
            drop(logger);

            // The repaired log reopens cleanly and accepts new records.
            let logger = Logger::open(&cut_path).unwrap();
            logger.log(b"after repair").unwrap();
            drop(logger);
            let logger = Logger::open(&cut_path).unwrap();
            assert_eq!(logger.records().unwrap().len(), complete + 1);
        }
    }

    #[test]
    fn test_unacknowledged_record_dropped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        write_log(&path, &[b"kept".to_vec()]);
        let header = std::fs::read(&path).unwrap()[..4].to_vec();

        // Append a full record, then restore the old header as if the
        // process died before updating it.
        let logger = Logger::open(&path).unwrap();
        logger.log(b"lost").unwrap();
        drop(logger);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[..4].copy_from_slice(&header);
        std::fs::write(&path, &bytes).unwrap();

        let logger = Logger::open(&path).unwrap();
        let records = logger.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref(), b"kept");
    }

    #[test]
    fn test_corrupt_header_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        write_log(&path, &payloads());

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = Logger::open(&path).unwrap_err();
        assert!(matches!(err, WalError::Corrupted { .. }));
    }

    #[test]
    fn test_short_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        std::fs::write(&path, [0u8, 0]).unwrap();
        assert!(matches!(
            Logger::open(&path).unwrap_err(),
            WalError::Corrupted { .. }
        ));
    }

    #[test]
    fn test_concurrent_log() {
        use std::sync::Arc;
        use std::thread;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.log");
        let logger = Arc::new(Logger::create(&path).unwrap());

        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let logger = Arc::clone(&logger);
                thread::spawn(move || {
                    for i in 0..10u8 {
                        logger.log(&[t, i]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(logger);

        let logger = Logger::open(&path).unwrap();
        assert_eq!(logger.records().unwrap().len(), 40);
    }
}
