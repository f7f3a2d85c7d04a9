//! Crash recovery.
//!
//! Runs when the checkpoint page shows the previous shutdown was not clean.
//!
//! ```text
//!   1. scan    decode every record, find the highest page touched
//!   2. shrink  truncate the page file to that page
//!   3. redo    file order:    committed (and super) records, after-images
//!   4. undo    reverse order: other records, before-images
//!   5. finish  mark undone transactions that are still active as aborted
//! ```
//!
//! Undoing an insert flips the item's valid flag instead of erasing it.
//! An undo is skipped when a committed record later in the log wrote the
//! same item, since the redo pass already installed the newer image.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info};

use strata_common::types::{PageNo, Uid, Xid};
use strata_txn::TransactionOracle;
use strata_wal::{LogRecord, Logger};

use crate::cache::PageCache;
use crate::error::StorageResult;
use crate::item::DataItem;
use crate::page::DataPage;

/// Counters describing one recovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Records read from the log.
    pub records: usize,
    /// Records reapplied by the redo pass.
    pub redone: usize,
    /// Records rolled back by the undo pass.
    pub undone: usize,
    /// Undo records skipped because a later committed record covers them.
    pub skipped: usize,
    /// Transactions marked aborted.
    pub aborted: usize,
    /// Page count after truncation.
    pub page_count: u32,
}

/// Replays the log against the page file.
pub fn recover(
    tm: &dyn TransactionOracle,
    logger: &Logger,
    pages: &PageCache,
) -> StorageResult<RecoveryStats> {
    info!(log = %logger.path().display(), "recovering from unclean shutdown");

    let records = logger
        .records()?
        .iter()
        .map(|data| LogRecord::decode(data))
        .collect::<Result<Vec<_>, _>>()?;

    let max_page = records
        .iter()
        .map(|record| record.page_no())
        .max()
        .unwrap_or(PageNo::CHECKPOINT)
        .max(PageNo::CHECKPOINT);
    pages.truncate(max_page)?;

    let mut stats = RecoveryStats {
        records: records.len(),
        page_count: max_page.as_u32(),
        ..Default::default()
    };

    let mut committed = Vec::with_capacity(records.len());
    for record in &records {
        committed.push(tm.is_committed(record.xid())?);
    }

    for (record, _) in records.iter().zip(&committed).filter(|(_, c)| **c) {
        redo(record, pages)?;
        stats.redone += 1;
    }

    let mut written_later: HashSet<Uid> = HashSet::new();
    let mut undone_xids: BTreeSet<Xid> = BTreeSet::new();
    for (record, &is_committed) in records.iter().zip(&committed).rev() {
        let uid = target_uid(record);
        if is_committed {
            written_later.insert(uid);
            continue;
        }
        undone_xids.insert(record.xid());
        if written_later.contains(&uid) {
            debug!(?uid, xid = %record.xid(), "undo covered by later committed write");
            stats.skipped += 1;
            continue;
        }
        undo(record, pages)?;
        stats.undone += 1;
    }

    for xid in undone_xids {
        if tm.is_active(xid)? {
            tm.abort(xid)?;
            stats.aborted += 1;
        }
    }

    info!(
        records = stats.records,
        redone = stats.redone,
        undone = stats.undone,
        skipped = stats.skipped,
        aborted = stats.aborted,
        page_count = stats.page_count,
        "recovery finished"
    );
    Ok(stats)
}

fn target_uid(record: &LogRecord) -> Uid {
    match record {
        LogRecord::Insert {
            page_no, offset, ..
        } => Uid::from_parts(*page_no, *offset),
        LogRecord::Update { uid, .. } => *uid,
    }
}

fn redo(record: &LogRecord, pages: &PageCache) -> StorageResult<()> {
    let page = pages.get_page(record.page_no())?;
    let result = match record {
        LogRecord::Insert { offset, raw, .. } => DataPage::recover_insert(&page, raw, *offset),
        LogRecord::Update { uid, new_raw, .. } => {
            DataPage::recover_update(&page, new_raw, uid.offset())
        }
    };
    pages.release(&page)?;
    result
}

fn undo(record: &LogRecord, pages: &PageCache) -> StorageResult<()> {
    let page = pages.get_page(record.page_no())?;
    let result = match record {
        LogRecord::Insert { offset, raw, .. } => {
            let mut raw = raw.to_vec();
            DataItem::set_raw_invalid(&mut raw);
            DataPage::recover_insert(&page, &raw, *offset)
        }
        LogRecord::Update { uid, old_raw, .. } => {
            DataPage::recover_update(&page, old_raw, uid.offset())
        }
    };
    pages.release(&page)?;
    result
}
