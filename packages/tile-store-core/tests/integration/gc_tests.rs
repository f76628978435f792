//! Garbage collection of retired versions and slot reuse.

use tile_store_core::config::StoreConfig;
use tile_store_core::database::Database;
use tile_store_core::dml;
use tile_store_core::expression::ProjectInfo;
use tile_store_core::types::Value;

use super::helpers::{account, create_accounts, database, insert_committed, locate, visible_rows};

#[test]
fn test_aborted_insert_slot_is_reused() {
    let db = database(16);
    let table = create_accounts(&db);
    let pk = table.primary_key_index().unwrap().unwrap();
    let ctx = db.context();

    let mut handle = db.begin_transaction().unwrap();
    let aborted = dml::insert(&ctx, &table, &account(1, "ghost", 0), handle.transaction_mut()).unwrap();
    handle.abort().unwrap();

    assert_eq!(db.collect_garbage().unwrap(), 1);
    assert!(pk.scan_key(&[Value::Integer(1)]).unwrap().is_empty());
    assert_eq!(table.tuple_count(), 0);

    let reused = insert_committed(&db, &table, &account(2, "real", 5));
    assert_eq!(reused, aborted);
    assert_eq!(locate(&db, &table, 1), None);
    assert_eq!(visible_rows(&db, &table), vec![account(2, "real", 5)]);
}

#[test]
fn test_old_version_reclaimed_after_update() {
    let db = database(16);
    let table = create_accounts(&db);
    let old = insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let new = dml::update(
        &ctx,
        &table,
        old,
        &ProjectInfo::assign(3, vec![(2, Value::Integer(20))]),
        handle.transaction_mut(),
    )
    .unwrap();
    handle.commit().unwrap();
    assert_eq!(table.tuple_count(), 2);

    assert_eq!(db.collect_garbage().unwrap(), 1);
    assert_eq!(table.tuple_count(), 1);
    assert_eq!(locate(&db, &table, 1), Some(new));
    let group = table.get_tile_group_by_id(new.block).unwrap();
    assert!(group.header().prev_item_pointer(new.offset).is_null());

    let reused = insert_committed(&db, &table, &account(2, "bob", 0));
    assert_eq!(reused, old);
    assert_eq!(
        visible_rows(&db, &table),
        vec![account(1, "alice", 20), account(2, "bob", 0)]
    );
}

#[test]
fn test_running_snapshot_holds_back_collection() {
    let db = database(16);
    let table = create_accounts(&db);
    let old = insert_committed(&db, &table, &account(1, "alice", 10));

    let reader = db.begin_transaction().unwrap();
    let ctx = db.context();
    let mut writer = db.begin_transaction().unwrap();
    dml::update(
        &ctx,
        &table,
        old,
        &ProjectInfo::assign(3, vec![(2, Value::Integer(11))]),
        writer.transaction_mut(),
    )
    .unwrap();
    writer.commit().unwrap();

    assert_eq!(db.collect_garbage().unwrap(), 0);
    let vacuum = db.vacuum().unwrap();
    assert_eq!(vacuum.pending_count(), 1);

    drop(reader);
    assert_eq!(db.collect_garbage().unwrap(), 1);
    assert_eq!(vacuum.pending_count(), 0);
    assert_eq!(vacuum.free_slot_count(table.oid()), 1);
}

#[test]
fn test_delete_reclaims_version_and_tombstone() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));
    let pk = table.primary_key_index().unwrap().unwrap();

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::delete(&ctx, &table, location, handle.transaction_mut()).unwrap();
    handle.commit().unwrap();

    assert_eq!(db.collect_garbage().unwrap(), 2);
    assert_eq!(table.tuple_count(), 0);
    assert_eq!(pk.entry_count().unwrap(), 0);
}

#[test]
fn test_collection_disabled() {
    let db = Database::new(StoreConfig {
        gc_enabled: false,
        ..StoreConfig::default()
    })
    .unwrap();
    let table = create_accounts(&db);
    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let first = dml::insert(&ctx, &table, &account(1, "a", 0), handle.transaction_mut()).unwrap();
    handle.abort().unwrap();

    assert!(db.vacuum().is_none());
    assert_eq!(db.collect_garbage().unwrap(), 0);
    let second = insert_committed(&db, &table, &account(1, "a", 0));
    assert_ne!(first, second);
}
