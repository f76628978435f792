//! Configuration loading and validation.

use std::io::Write;

use tempfile::NamedTempFile;

use tile_store_core::config::StoreConfig;
use tile_store_core::database::Database;
use tile_store_core::error::StoreError;
use tile_store_core::storage::LayoutType;
use tile_store_core::types::{Column, Schema, Tuple, Value};

use super::helpers::insert_committed;

#[test]
fn test_config_from_file_drives_tables() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"{{"tuples_per_tile_group": 3, "layout": "column", "max_cascade_depth": 4}}"#
    )?;

    let config = StoreConfig::from_file(file.path())?;
    assert_eq!(config.tuples_per_tile_group, 3);
    assert_eq!(config.layout, LayoutType::Column);
    assert_eq!(config.gc_max_attempts, StoreConfig::default().gc_max_attempts);

    let db = Database::new(config)?;
    let table = db.create_table(
        "wide",
        Schema::new(vec![Column::integer("a"), Column::integer("b")])?,
    )?;
    assert_eq!(table.get_tile_group(0).unwrap().tile_count(), 2);
    for v in 0..4 {
        insert_committed(&db, &table, &Tuple::new(vec![Value::Integer(v), Value::Integer(-v)]));
    }
    assert_eq!(table.tile_group_count(), 2);
    Ok(())
}

#[test]
fn test_missing_or_malformed_file() {
    assert!(matches!(
        StoreConfig::from_file("/nonexistent/tilestore.json"),
        Err(StoreError::Config(_))
    ));
    assert!(matches!(
        StoreConfig::from_json("{ not json"),
        Err(StoreError::Config(_))
    ));
}

#[test]
fn test_overrides_then_validation() {
    let mut config = StoreConfig::default();
    config
        .apply_overrides([
            ("TILESTORE_ACTIVE_TILE_GROUP_COUNT", "2"),
            ("TILESTORE_GC_MAX_ATTEMPTS", "10"),
        ])
        .unwrap();
    assert_eq!(config.active_tile_group_count, 2);
    assert_eq!(config.gc_max_attempts, 10);

    let err = config
        .apply_overrides([("TILESTORE_INDIRECTION_ARRAY_SIZE", "0")])
        .unwrap_err();
    assert!(matches!(err, StoreError::Config(_)));

    let invalid = StoreConfig {
        active_tile_group_count: 0,
        ..StoreConfig::default()
    };
    assert!(matches!(Database::new(invalid), Err(StoreError::Config(_))));
}
