//! Version-chain updates and deletes.

use tile_store_core::dml;
use tile_store_core::error::StoreError;
use tile_store_core::expression::{ProjectInfo, TargetExpr};
use tile_store_core::index::IndexConstraintType;
use tile_store_core::transaction::ResultType;
use tile_store_core::types::Value;

use super::helpers::{account, create_accounts, database, insert_committed, locate, visible_rows};

fn set_balance(balance: i64) -> ProjectInfo {
    ProjectInfo::assign(3, vec![(2, Value::Integer(balance))])
}

#[test]
fn test_non_key_update_writes_only_touched_indexes() {
    let db = database(16);
    let table = create_accounts(&db);
    let by_name = db
        .create_index("accounts", "accounts_name", &["name"], IndexConstraintType::Default)
        .unwrap();
    let by_balance = db
        .create_index("accounts", "accounts_balance", &["balance"], IndexConstraintType::Default)
        .unwrap();
    let pk = table.primary_key_index().unwrap().unwrap();
    let location = insert_committed(&db, &table, &account(1, "alice", 10));
    let writes = |index: &tile_store_core::index::Index| index.write_count();
    let (pk_before, name_before, balance_before) = (writes(&pk), writes(&by_name), writes(&by_balance));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let new_location = dml::update(&ctx, &table, location, &set_balance(20), handle.transaction_mut()).unwrap();
    assert_ne!(new_location, location);
    assert_eq!(handle.commit().unwrap(), ResultType::Success);

    assert_eq!(writes(&pk), pk_before);
    assert_eq!(writes(&by_name), name_before);
    assert_eq!(writes(&by_balance), balance_before + 1);
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 20)]);
}

#[test]
fn test_update_of_unindexed_column_writes_no_index() {
    let db = database(16);
    let table = create_accounts(&db);
    let pk = table.primary_key_index().unwrap().unwrap();
    let location = insert_committed(&db, &table, &account(1, "alice", 10));
    let before = pk.write_count();

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &table, location, &set_balance(11), handle.transaction_mut()).unwrap();
    handle.commit().unwrap();
    assert_eq!(pk.write_count(), before);
}

#[test]
fn test_derived_update_and_in_place_rewrite() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));
    let add_five = ProjectInfo::for_update(
        3,
        vec![(
            2,
            TargetExpr::derived(|old| Value::Integer(old.value(2).as_integer().unwrap_or(0) + 5)),
        )],
    );

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let first = dml::update(&ctx, &table, location, &add_five, handle.transaction_mut()).unwrap();
    let slots_after_first = table.tuple_count();
    // second update rewrites the transaction's own version
    let second = dml::update(&ctx, &table, first, &add_five, handle.transaction_mut()).unwrap();
    assert_eq!(first, second);
    assert_eq!(table.tuple_count(), slots_after_first);
    handle.commit().unwrap();

    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 20)]);
}

#[test]
fn test_abort_restores_old_version() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &table, location, &set_balance(99), handle.transaction_mut()).unwrap();
    assert_eq!(handle.abort().unwrap(), ResultType::Aborted);

    assert_eq!(locate(&db, &table, 1), Some(location));
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 10)]);

    // the row can be claimed again
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &table, location, &set_balance(12), handle.transaction_mut()).unwrap();
    handle.commit().unwrap();
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 12)]);
}

#[test]
fn test_snapshot_reads_old_version_during_update() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let reader = db.begin_transaction().unwrap();
    let mut writer = db.begin_transaction().unwrap();
    dml::update(&ctx, &table, location, &set_balance(50), writer.transaction_mut()).unwrap();
    writer.commit().unwrap();

    let pk = table.primary_key_index().unwrap().unwrap();
    let seen = dml::lookup_visible(&ctx, &table, &pk, &[Value::Integer(1)], reader.transaction()).unwrap();
    assert_eq!(seen, vec![(location, account(1, "alice", 10))]);
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 50)]);
}

#[test]
fn test_primary_key_update_moves_row() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));
    insert_committed(&db, &table, &account(2, "bob", 0));

    let ctx = db.context();
    let rekey = |id: i64| ProjectInfo::assign(3, vec![(0, Value::Integer(id))]);

    let mut handle = db.begin_transaction().unwrap();
    let err = dml::update(&ctx, &table, location, &rekey(2), handle.transaction_mut()).unwrap_err();
    assert!(matches!(err, StoreError::IndexConflict { .. }));
    assert_eq!(handle.commit().unwrap(), ResultType::Aborted);
    assert_eq!(locate(&db, &table, 1), Some(location));

    let mut handle = db.begin_transaction().unwrap();
    let moved = dml::update(&ctx, &table, location, &rekey(7), handle.transaction_mut()).unwrap();
    assert_ne!(moved, location);
    handle.commit().unwrap();

    assert_eq!(locate(&db, &table, 1), None);
    assert_eq!(locate(&db, &table, 7), Some(moved));
    assert_eq!(
        visible_rows(&db, &table),
        vec![account(2, "bob", 0), account(7, "alice", 10)]
    );
}

#[test]
fn test_delete_hides_row_and_frees_key() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::delete(&ctx, &table, location, handle.transaction_mut()).unwrap();
    assert!(dml::scan_visible(&ctx, &table, handle.transaction()).unwrap().is_empty());
    handle.commit().unwrap();

    assert!(visible_rows(&db, &table).is_empty());
    insert_committed(&db, &table, &account(1, "alice again", 0));
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice again", 0)]);
}

#[test]
fn test_delete_own_insert() {
    let db = database(16);
    let table = create_accounts(&db);
    let ctx = db.context();

    let mut handle = db.begin_transaction().unwrap();
    let location = dml::insert(&ctx, &table, &account(1, "temp", 0), handle.transaction_mut()).unwrap();
    dml::delete(&ctx, &table, location, handle.transaction_mut()).unwrap();
    assert_eq!(handle.commit().unwrap(), ResultType::Success);
    assert!(visible_rows(&db, &table).is_empty());
}

#[test]
fn test_update_of_stale_version_is_rejected() {
    let db = database(16);
    let table = create_accounts(&db);
    let location = insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &table, location, &set_balance(1), handle.transaction_mut()).unwrap();
    handle.commit().unwrap();

    let mut handle = db.begin_transaction().unwrap();
    let err = dml::update(&ctx, &table, location, &set_balance(2), handle.transaction_mut()).unwrap_err();
    assert_eq!(err, StoreError::TupleNotVisible { location });
}
