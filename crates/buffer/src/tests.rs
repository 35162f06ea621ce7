use super::*;
use std::sync::Arc;
use storage::{HeapFile, HeapFileIter};
use tempfile::tempdir;
use types::{Field, FieldDesc, FieldType, Tuple, TupleDesc};

fn person_desc() -> TupleDesc {
    TupleDesc::try_new(vec![
        FieldDesc::new("id", FieldType::Int32),
        FieldDesc::new("name", FieldType::Str(16)),
    ])
    .unwrap()
}

fn person(id: i32, name: &str) -> Tuple {
    Tuple::new(&person_desc(), vec![Field::Int(id), Field::Str(name.into())]).unwrap()
}

fn heap_in(dir: &std::path::Path, name: &str) -> HeapFile {
    HeapFile::open(&dir.join(name), person_desc(), 4096).unwrap()
}

#[test]
fn insert_and_get_round_trip() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid = pool.insert_tuple(tid, table_id, &person(1, "Ada")).unwrap();
    let page = pool.get_page(tid, rid.page_id, Permission::ReadOnly).unwrap();
    assert_eq!(page.read_tuple(rid.slot).unwrap().values(), person(1, "Ada").values());
}

#[test]
fn insert_allocates_a_new_page_once_the_first_is_full() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(8);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let mut last_page = None;
    for i in 0..400 {
        let rid = pool.insert_tuple(tid, table_id, &person(i, "x")).unwrap();
        last_page = Some(rid.page_id.page_number);
    }
    assert!(last_page.unwrap() > 0, "400 rows must overflow a single 4KB page");
}

#[test]
fn delete_clears_the_slot() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid = pool.insert_tuple(tid, table_id, &person(1, "Ada")).unwrap();
    pool.delete_tuple(tid, rid).unwrap();
    let page = pool.get_page(tid, rid.page_id, Permission::ReadOnly).unwrap();
    assert!(page.read_tuple(rid.slot).is_err());
}

#[test]
fn commit_flushes_dirty_pages_and_releases_locks() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid = pool.insert_tuple(tid, table_id, &person(1, "Ada")).unwrap();
    pool.transaction_complete(tid, true).unwrap();

    // Evict everything, forcing a fresh read from disk.
    pool.discard(rid.page_id);
    let tid2 = TransactionId::new();
    let page = pool.get_page(tid2, rid.page_id, Permission::ReadOnly).unwrap();
    assert_eq!(page.read_tuple(rid.slot).unwrap().values(), person(1, "Ada").values());
}

#[test]
fn abort_rolls_back_to_the_on_disk_image() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));

    let tid1 = TransactionId::new();
    let rid = pool.insert_tuple(tid1, table_id, &person(1, "Ada")).unwrap();
    pool.transaction_complete(tid1, true).unwrap();

    let tid2 = TransactionId::new();
    pool.delete_tuple(tid2, rid).unwrap();
    pool.transaction_complete(tid2, false).unwrap();

    let tid3 = TransactionId::new();
    let page = pool.get_page(tid3, rid.page_id, Permission::ReadOnly).unwrap();
    assert_eq!(
        page.read_tuple(rid.slot).unwrap().values(),
        person(1, "Ada").values(),
        "aborted delete must not be visible"
    );
}

#[test]
fn transaction_complete_is_idempotent() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    pool.insert_tuple(tid, table_id, &person(1, "Ada")).unwrap();
    pool.transaction_complete(tid, true).unwrap();
    pool.transaction_complete(tid, true).unwrap();
}

#[test]
fn eviction_never_writes_a_dirty_page() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(1);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid0 = pool.insert_tuple(tid, table_id, &person(0, "a")).unwrap();
    // A second page can't be brought in: the only cached page is dirty.
    let err = pool.get_page(tid, PageId::new(table_id.0, rid0.page_id.page_number + 1), Permission::ReadOnly);
    assert!(err.is_err(), "NoCleanPage expected when every resident page is dirty");
}

#[test]
fn clean_page_is_evicted_to_make_room() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(1);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid0 = pool.insert_tuple(tid, table_id, &person(0, "a")).unwrap();
    pool.transaction_complete(tid, true).unwrap(); // now clean

    let tid2 = TransactionId::new();
    let other_pid = PageId::new(table_id.0, rid0.page_id.page_number + 1);
    let page = pool.get_page(tid2, other_pid, Permission::ReadOnly);
    assert!(page.is_ok(), "a clean page must be evictable to admit a new one");
}

#[test]
fn scan_yields_exactly_inserted_minus_deleted_tuples() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(8);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let mut rids = Vec::new();
    for i in 0..50 {
        rids.push(pool.insert_tuple(tid, table_id, &person(i, "x")).unwrap());
    }
    for rid in rids.iter().step_by(2) {
        pool.delete_tuple(tid, *rid).unwrap();
    }
    pool.transaction_complete(tid, true).unwrap();

    let tid2 = TransactionId::new();
    let mut cursor = BufferPoolCursor::new(&pool, tid2);
    let mut iter = HeapFileIter::new(&mut cursor, table_id);
    iter.open().unwrap();
    let mut count = 0;
    while iter.next().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 25, "50 inserts minus 25 deletes must leave 25 live tuples");
}

#[test]
fn shared_to_exclusive_upgrade_succeeds_for_sole_holder() {
    let dir = tempdir().unwrap();
    let pool = BufferPool::new(4);
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid = TransactionId::new();

    let rid = pool.insert_tuple(tid, table_id, &person(1, "Ada")).unwrap();
    pool.transaction_complete(tid, true).unwrap();

    let tid2 = TransactionId::new();
    pool.get_page(tid2, rid.page_id, Permission::ReadOnly).unwrap();
    // Same transaction upgrading to exclusive must succeed immediately.
    pool.get_page(tid2, rid.page_id, Permission::ReadWrite).unwrap();
}

#[test]
fn a_second_transaction_times_out_on_a_conflicting_exclusive_lock() {
    let dir = tempdir().unwrap();
    let pool = Arc::new(BufferPool::new(4));
    let table_id = pool.register_table(heap_in(dir.path(), "t.tbl"));
    let tid1 = TransactionId::new();

    let rid = pool.insert_tuple(tid1, table_id, &person(1, "Ada")).unwrap();
    // tid1 still holds the exclusive lock it took out while inserting.
    let tid2 = TransactionId::new();
    let result = pool.get_page(tid2, rid.page_id, Permission::ReadOnly);
    assert!(matches!(result, Err(DbError::TransactionAborted(_))));
}
