//! Foreign key checks on insert and referential actions on update/delete.

use std::sync::Arc;

use tile_store_core::config::StoreConfig;
use tile_store_core::database::Database;
use tile_store_core::dml;
use tile_store_core::error::{ConstraintErrorKind, StoreError};
use tile_store_core::expression::ProjectInfo;
use tile_store_core::index::IndexConstraintType;
use tile_store_core::table::{DataTable, FkAction};
use tile_store_core::transaction::ResultType;
use tile_store_core::types::{Column, ColumnType, Schema, Tuple, Value};

use super::helpers::{database, insert_committed, locate, visible_rows};

fn parent(id: i64) -> Tuple {
    Tuple::new(vec![Value::Integer(id)])
}

fn child(id: i64, parent_id: Option<i64>) -> Tuple {
    Tuple::new(vec![
        Value::Integer(id),
        parent_id.map(Value::Integer).unwrap_or(Value::Null),
    ])
}

/// `p(id PK)` and `c(id PK, p_id REFERENCES p(id))`.
fn parent_child(db: &Database, on_update: FkAction, on_delete: FkAction) -> (Arc<DataTable>, Arc<DataTable>) {
    let p = db
        .create_table("p", Schema::new(vec![Column::integer("id")]).unwrap())
        .unwrap();
    db.create_index("p", "p_pk", &["id"], IndexConstraintType::PrimaryKey)
        .unwrap();
    let c = db
        .create_table(
            "c",
            Schema::new(vec![
                Column::integer("id"),
                Column::new("p_id", ColumnType::Integer, true),
            ])
            .unwrap(),
        )
        .unwrap();
    db.create_index("c", "c_pk", &["id"], IndexConstraintType::PrimaryKey)
        .unwrap();
    db.add_foreign_key("c_p_fk", "c", &["p_id"], "p", &["id"], on_update, on_delete)
        .unwrap();
    (p, c)
}

fn rekey(id: i64) -> ProjectInfo {
    ProjectInfo::assign(1, vec![(0, Value::Integer(id))])
}

#[test]
fn test_insert_requires_matching_parent() {
    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::NoAction, FkAction::NoAction);
    let ctx = db.context();

    let mut handle = db.begin_transaction().unwrap();
    let err = dml::insert(&ctx, &c, &child(1, Some(1)), handle.transaction_mut()).unwrap_err();
    assert_eq!(
        err,
        StoreError::ConstraintViolation {
            table: "c".to_string(),
            kind: ConstraintErrorKind::ForeignKey {
                constraint: "c_p_fk".to_string(),
                sink_table: "p".to_string(),
            },
        }
    );
    assert_eq!(handle.commit().unwrap(), ResultType::Aborted);

    insert_committed(&db, &p, &parent(1));
    insert_committed(&db, &c, &child(1, Some(1)));
    insert_committed(&db, &c, &child(2, None));
    assert_eq!(visible_rows(&db, &c).len(), 2);
}

#[test]
fn test_insert_does_not_see_uncommitted_parent_of_other_transaction() {
    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::NoAction, FkAction::NoAction);
    let ctx = db.context();

    let mut writer = db.begin_transaction().unwrap();
    dml::insert(&ctx, &p, &parent(3), writer.transaction_mut()).unwrap();

    let mut other = db.begin_transaction().unwrap();
    assert!(dml::insert(&ctx, &c, &child(1, Some(3)), other.transaction_mut()).is_err());

    // the writer sees its own parent
    assert!(dml::insert(&ctx, &c, &child(2, Some(3)), writer.transaction_mut()).is_ok());
    assert_eq!(writer.commit().unwrap(), ResultType::Success);
}

#[test]
fn test_update_cascades_key_change() {
    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::Cascade, FkAction::NoAction);
    let parent_location = insert_committed(&db, &p, &parent(1));
    let old_child = insert_committed(&db, &c, &child(10, Some(1)));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &p, parent_location, &rekey(2), handle.transaction_mut()).unwrap();
    assert_eq!(handle.commit().unwrap(), ResultType::Success);

    assert_eq!(visible_rows(&db, &p), vec![parent(2)]);
    assert_eq!(visible_rows(&db, &c), vec![child(10, Some(2))]);

    let reader = db.begin_transaction().unwrap();
    let group = c.get_tile_group_by_id(old_child.block).unwrap();
    assert_ne!(
        db.txn_manager().is_visible(reader.transaction(), &group, old_child.offset),
        tile_store_core::transaction::VisibilityType::Ok
    );
}

#[test]
fn test_update_cascades_to_every_child() {
    let db = database(4);
    let (p, c) = parent_child(&db, FkAction::Cascade, FkAction::NoAction);
    let parent_location = insert_committed(&db, &p, &parent(1));
    insert_committed(&db, &p, &parent(5));
    for id in 0..6 {
        insert_committed(&db, &c, &child(id, Some(if id % 2 == 0 { 1 } else { 5 })));
    }

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::update(&ctx, &p, parent_location, &rekey(9), handle.transaction_mut()).unwrap();
    handle.commit().unwrap();

    let expected: Vec<Tuple> = (0..6)
        .map(|id| child(id, Some(if id % 2 == 0 { 9 } else { 5 })))
        .collect();
    assert_eq!(visible_rows(&db, &c), expected);
}

#[test]
fn test_restrict_blocks_update_and_leaves_rows() {
    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::Restrict, FkAction::Restrict);
    let parent_location = insert_committed(&db, &p, &parent(1));
    insert_committed(&db, &c, &child(10, Some(1)));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::update(&ctx, &p, parent_location, &rekey(2), handle.transaction_mut()).unwrap_err();
    assert_eq!(
        err,
        StoreError::ForeignKeyRestrict {
            constraint: "c_p_fk".to_string(),
            source_table: "c".to_string(),
        }
    );
    assert_eq!(handle.commit().unwrap(), ResultType::Aborted);

    assert_eq!(visible_rows(&db, &p), vec![parent(1)]);
    assert_eq!(visible_rows(&db, &c), vec![child(10, Some(1))]);
}

#[test]
fn test_unreferenced_parent_can_change() {
    let db = database(16);
    let (p, _c) = parent_child(&db, FkAction::Restrict, FkAction::Restrict);
    let location = insert_committed(&db, &p, &parent(1));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::delete(&ctx, &p, location, handle.transaction_mut()).unwrap();
    assert_eq!(handle.commit().unwrap(), ResultType::Success);
    assert!(visible_rows(&db, &p).is_empty());
}

#[test]
fn test_delete_cascade_and_restrict() {
    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::NoAction, FkAction::Cascade);
    let first = insert_committed(&db, &p, &parent(1));
    insert_committed(&db, &p, &parent(2));
    insert_committed(&db, &c, &child(10, Some(1)));
    insert_committed(&db, &c, &child(11, Some(1)));
    insert_committed(&db, &c, &child(12, Some(2)));

    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::delete(&ctx, &p, first, handle.transaction_mut()).unwrap();
    handle.commit().unwrap();
    assert_eq!(visible_rows(&db, &p), vec![parent(2)]);
    assert_eq!(visible_rows(&db, &c), vec![child(12, Some(2))]);

    let db = database(16);
    let (p, c) = parent_child(&db, FkAction::NoAction, FkAction::NoAction);
    let location = insert_committed(&db, &p, &parent(1));
    insert_committed(&db, &c, &child(10, Some(1)));
    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::delete(&ctx, &p, location, handle.transaction_mut()).unwrap_err();
    assert!(matches!(err, StoreError::ForeignKeyRestrict { .. }));
    drop(handle);
    assert_eq!(visible_rows(&db, &p), vec![parent(1)]);
    assert_eq!(visible_rows(&db, &c), vec![child(10, Some(1))]);
}

/// `node(id PK, parent REFERENCES node(id) ON DELETE CASCADE)` holding a
/// chain `1 <- 2 <- ... <- len`.
fn chain(max_cascade_depth: usize, len: i64) -> (Database, Arc<DataTable>) {
    let db = Database::new(StoreConfig {
        max_cascade_depth,
        ..StoreConfig::default()
    })
    .unwrap();
    let node = db
        .create_table(
            "node",
            Schema::new(vec![
                Column::integer("id"),
                Column::new("parent", ColumnType::Integer, true),
            ])
            .unwrap(),
        )
        .unwrap();
    db.create_index("node", "node_pk", &["id"], IndexConstraintType::PrimaryKey)
        .unwrap();
    db.add_foreign_key("node_parent_fk", "node", &["parent"], "node", &["id"], FkAction::NoAction, FkAction::Cascade)
        .unwrap();
    for id in 1..=len {
        insert_committed(&db, &node, &child(id, (id > 1).then(|| id - 1)));
    }
    (db, node)
}

#[test]
fn test_cascade_depth_is_bounded() {
    let (db, node) = chain(2, 5);
    let root = locate(&db, &node, 1).unwrap();
    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    let err = dml::delete(&ctx, &node, root, handle.transaction_mut()).unwrap_err();
    assert_eq!(err, StoreError::CascadeDepthExceeded { depth: 2 });
    assert_eq!(handle.commit().unwrap(), ResultType::Aborted);
    assert_eq!(visible_rows(&db, &node).len(), 5);
}

#[test]
fn test_self_referencing_cascade_deletes_chain() {
    let (db, node) = chain(16, 5);
    let root = locate(&db, &node, 1).unwrap();
    let ctx = db.context();
    let mut handle = db.begin_transaction().unwrap();
    dml::delete(&ctx, &node, root, handle.transaction_mut()).unwrap();
    assert_eq!(handle.commit().unwrap(), ResultType::Success);
    assert!(visible_rows(&db, &node).is_empty());
}
