//! Insert path: slot placement, tile group growth and validation failures.

use tile_store_core::dml;
use tile_store_core::error::{ConstraintErrorKind, StoreError};
use tile_store_core::index::IndexConstraintType;
use tile_store_core::storage::ItemPointer;
use tile_store_core::transaction::ResultType;
use tile_store_core::types::{CheckConstraint, Column, CompareOp, Schema, Tuple, Value};

use super::helpers::{account, create_accounts, database, insert_committed, visible_rows};

#[test]
fn test_three_inserts_fill_two_tile_groups() {
    let db = database(2);
    let schema = Schema::new(vec![Column::integer("v")]).unwrap();
    let table = db.create_table("t", schema).unwrap();

    let locations: Vec<ItemPointer> = (0..3)
        .map(|v| insert_committed(&db, &table, &Tuple::new(vec![Value::Integer(v)])))
        .collect();

    assert_eq!(table.tile_group_count(), 2);
    let g0 = table.get_tile_group(0).unwrap().id();
    let g1 = table.get_tile_group(1).unwrap().id();
    assert_eq!(
        locations,
        vec![ItemPointer::new(g0, 0), ItemPointer::new(g0, 1), ItemPointer::new(g1, 0)]
    );
    assert_eq!(table.tuple_count(), 3);
}

#[test]
fn test_check_failure_leaves_no_index_entry() {
    let db = database(16);
    let schema = Schema::new(vec![Column::integer("id"), Column::integer("qty")])
        .unwrap()
        .with_check(CheckConstraint::new("qty_positive", 1, CompareOp::Gt, Value::Integer(0)))
        .unwrap();
    let table = db.create_table("stock", schema).unwrap();
    let pk = db
        .create_index("stock", "stock_pk", &["id"], IndexConstraintType::PrimaryKey)
        .unwrap();
    let by_qty = db
        .create_index("stock", "stock_qty", &["qty"], IndexConstraintType::Default)
        .unwrap();

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::insert(&ctx, &table, &Tuple::new(vec![Value::Integer(1), Value::Integer(-3)]), handle.transaction_mut())
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConstraintViolation {
            kind: ConstraintErrorKind::Check { .. },
            ..
        }
    ));
    assert_eq!(handle.transaction().result(), ResultType::Failure);
    assert_eq!(handle.commit().unwrap(), ResultType::Aborted);

    assert!(pk.scan_key(&[Value::Integer(1)]).unwrap().is_empty());
    assert!(by_qty.scan_key(&[Value::Integer(-3)]).unwrap().is_empty());
    assert_eq!(table.tuple_count(), 0);
}

#[test]
fn test_index_conflict_leaves_no_dangling_cell() {
    let db = database(16);
    let table = create_accounts(&db);
    let by_name = db
        .create_index("accounts", "accounts_name", &["name"], IndexConstraintType::Default)
        .unwrap();
    insert_committed(&db, &table, &account(1, "alice", 10));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::insert(&ctx, &table, &account(1, "mallory", 0), handle.transaction_mut()).unwrap_err();
    assert_eq!(
        err,
        StoreError::IndexConflict {
            index: "accounts_pk".to_string()
        }
    );
    drop(handle);

    assert!(by_name.scan_key(&[Value::from("mallory")]).unwrap().is_empty());
    assert_eq!(table.primary_key_index().unwrap().unwrap().entry_count().unwrap(), 1);
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 10)]);
}

#[test]
fn test_type_and_arity_errors() {
    let db = database(16);
    let table = create_accounts(&db);
    let ctx = db.context();

    let mut handle = db.begin_transaction().unwrap();
    let err = dml::insert(&ctx, &table, &Tuple::new(vec![Value::Integer(1)]), handle.transaction_mut()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConstraintViolation {
            kind: ConstraintErrorKind::Arity { expected: 3, got: 1 },
            ..
        }
    ));

    let mut handle = db.begin_transaction().unwrap();
    let wrong = Tuple::new(vec![Value::from("one"), Value::from("a"), Value::Integer(0)]);
    let err = dml::insert(&ctx, &table, &wrong, handle.transaction_mut()).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConstraintViolation {
            kind: ConstraintErrorKind::Type { .. },
            ..
        }
    ));
}

#[test]
fn test_unique_index_allows_repeated_nulls() {
    let db = database(16);
    let table = create_accounts(&db);
    db.create_index("accounts", "accounts_name_uq", &["name"], IndexConstraintType::Unique)
        .unwrap();

    let null_name = |id| Tuple::new(vec![Value::Integer(id), Value::Null, Value::Integer(0)]);
    insert_committed(&db, &table, &null_name(1));
    insert_committed(&db, &table, &null_name(2));
    insert_committed(&db, &table, &account(3, "carol", 0));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::insert(&ctx, &table, &account(4, "carol", 0), handle.transaction_mut()).unwrap_err();
    assert_eq!(
        err,
        StoreError::IndexConflict {
            index: "accounts_name_uq".to_string()
        }
    );
    assert_eq!(visible_rows(&db, &table).len(), 3);
}

#[test]
fn test_uncommitted_insert_is_private() {
    let db = database(16);
    let table = create_accounts(&db);
    let ctx = db.context();

    let mut writer = db.begin_transaction().unwrap();
    dml::insert(&ctx, &table, &account(1, "alice", 10), writer.transaction_mut()).unwrap();
    assert!(visible_rows(&db, &table).is_empty());
    assert_eq!(
        dml::scan_visible(&ctx, &table, writer.transaction()).unwrap().len(),
        1
    );

    writer.commit().unwrap();
    assert_eq!(visible_rows(&db, &table), vec![account(1, "alice", 10)]);
}
