//! System-wide constants for Strata.
//!
//! Most of these values are part of the on-disk format. Changing one of
//! them makes existing database files unreadable.

// =============================================================================
// Page Constants
// =============================================================================

/// Page size in bytes (8 KB).
pub const PAGE_SIZE: usize = 8 * 1024;

/// Minimum number of pages the page cache must be able to hold.
pub const MIN_CACHE_PAGES: usize = 10;

/// Size of the free-space-offset field at the start of every data page.
pub const FREE_SPACE_OFFSET_SIZE: usize = 2;

/// Largest payload a single data page can accept.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - FREE_SPACE_OFFSET_SIZE;

/// Number of free-space buckets in the page index.
pub const PAGE_INDEX_INTERVALS: usize = 40;

/// Byte offset of the open marker on the checkpoint page.
pub const CHECKPOINT_OFFSET: usize = 100;

/// Length of each checkpoint marker.
pub const CHECKPOINT_LEN: usize = 8;

// =============================================================================
// Data Manager Constants
// =============================================================================

/// Number of attempts to find a page with enough free space before giving up.
pub const INSERT_RETRIES: usize = 5;

// =============================================================================
// B+Tree Constants
// =============================================================================

/// Minimum occupancy of a B+Tree node; a node splits at twice this count.
pub const BALANCE_NUMBER: usize = 32;

// =============================================================================
// File Names
// =============================================================================

/// Suffix of the page file.
pub const DB_SUFFIX: &str = ".db";

/// Suffix of the write-ahead log file.
pub const LOG_SUFFIX: &str = ".log";

/// Suffix of the transaction status file.
pub const XID_SUFFIX: &str = ".xid";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_constants() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(MAX_FREE_SPACE, 8190);
        assert!(CHECKPOINT_OFFSET + 2 * CHECKPOINT_LEN < PAGE_SIZE);
    }

    #[test]
    fn test_page_index_interval_width() {
        // Every bucket must be at least one byte wide.
        assert!(PAGE_SIZE / PAGE_INDEX_INTERVALS > 0);
    }
}
