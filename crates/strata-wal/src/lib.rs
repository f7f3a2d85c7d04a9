//! # strata-wal
//!
//! Write-ahead logging for Strata.
//!
//! The log is a single append-only file of opaque byte records. Every
//! mutation of a data item is logged before it may reach the page file, and
//! recovery replays the log at startup.
//!
//! ## File Format
//!
//! ```text
//! +--------------+--------+--------+-----+--------+-----------+
//! | XChecksum(4) | Log 1  | Log 2  | ... | Log N  | Bad tail? |
//! +--------------+--------+--------+-----+--------+-----------+
//!
//! Log i:
//! +----------+--------------+----------------+
//! | Size (4) | Checksum (4) | Data (Size)    |
//! +----------+--------------+----------------+
//! ```
//!
//! `Checksum` is the CRC32 of `Data`. `XChecksum` is the CRC32 of every
//! well-formed record (header and data) concatenated in file order. A record
//! interrupted by a crash fails its own checksum and is cut off when the log
//! is opened.
//!
//! The records themselves are described by [`LogRecord`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;

/// The log file.
pub mod logger;

/// Typed log records.
pub mod record;

pub use error::{WalError, WalResult};
pub use logger::{LogStats, Logger};
pub use record::LogRecord;
