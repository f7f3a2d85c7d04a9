//! B+Tree bulk scenarios.

use std::sync::Arc;

use strata_common::types::{Uid, Xid};
use strata_storage::{BPlusTree, DataManager};
use strata_wal::LogRecord;
use strata_test::utils::TestDb;
use strata_test::workload::Workload;

fn value(key: u64) -> Uid {
    Uid::new(key << 8)
}

#[test]
fn test_bulk_insert_and_range_scan() {
    let db = TestDb::new().unwrap();
    let dm = Arc::new(DataManager::create(db.config()).unwrap());
    let boot = BPlusTree::create(&dm).unwrap();
    let tree = BPlusTree::load(boot, Arc::clone(&dm)).unwrap();

    let mut workload = Workload::new(5, 1, 1);
    let keys = workload.keys(3000);
    for &key in &keys {
        tree.insert(key, value(key)).unwrap();
    }

    let mut sorted = keys.clone();
    sorted.sort_unstable();
    let all = tree.search_range(0, u64::MAX - 1).unwrap();
    assert_eq!(all, sorted.iter().map(|&k| value(k)).collect::<Vec<_>>());

    let lo = sorted[1000];
    let hi = sorted[1099];
    assert_eq!(tree.search_range(lo, hi).unwrap().len(), 100);
    assert!(tree.search(sorted[0] + 1).unwrap().is_empty());

    tree.close().unwrap();
    dm.close().unwrap();
}

#[test]
fn test_index_points_at_rows_after_crash() {
    let db = TestDb::new().unwrap();
    let engine = db.create().unwrap();
    let boot = engine.create_index().unwrap();
    let index = engine.open_index(boot).unwrap();

    let xid = engine.begin_default().unwrap();
    let mut rows = Vec::new();
    for key in 0..300u64 {
        let uid = engine.insert(xid, &key.to_be_bytes()).unwrap();
        index.insert(key, uid).unwrap();
        rows.push(uid);
    }
    engine.commit(xid).unwrap();
    drop(index);
    db.crash(engine);

    let engine = db.open().unwrap();
    let index = engine.open_index(boot).unwrap();
    let reader = engine.begin_default().unwrap();
    for key in [0u64, 63, 64, 150, 299] {
        let found = index.search(key).unwrap();
        assert_eq!(found, vec![rows[key as usize]]);
        let row = engine.read(reader, found[0]).unwrap().unwrap();
        assert_eq!(&row[..], &key.to_be_bytes()[..]);
    }
    engine.commit(reader).unwrap();
    index.close().unwrap();
    engine.close().unwrap();
}

#[test]
fn test_tree_nodes_logged_under_super() {
    let db = TestDb::new().unwrap();
    let dm = Arc::new(DataManager::create(db.config()).unwrap());
    let boot = BPlusTree::create(&dm).unwrap();
    let tree = BPlusTree::load(boot, Arc::clone(&dm)).unwrap();
    tree.insert(1, value(1)).unwrap();

    let records = dm.logger().records().unwrap();
    assert!(!records.is_empty());
    for raw in records {
        assert_eq!(LogRecord::decode(&raw).unwrap().xid(), Xid::SUPER);
    }
    tree.close().unwrap();
}
