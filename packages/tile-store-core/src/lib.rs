//! Tile-group tuple storage for an in-memory MVCC engine.
//!
//! Provides fixed-capacity tile groups with concurrent slot allocation,
//! indirection cells that give every row a stable address across versions,
//! version-chain updates and deletes, index and foreign key enforcement, and
//! garbage collection of retired versions.

pub mod catalog;
pub mod config;
pub mod database;
pub mod dml;
pub mod error;
pub mod expression;
pub mod gc;
pub mod index;
pub mod storage;
pub mod table;
pub mod transaction;
pub mod types;

pub use catalog::Catalog;
pub use config::StoreConfig;
pub use database::Database;
pub use error::{ConstraintErrorKind, StoreError};
pub use storage::ItemPointer;
