//! Storage error types.

use thiserror::Error;

use crate::storage::{ItemPointer, Oid};

/// Which column-level or referential constraint a tuple violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintErrorKind {
    /// NULL written into a non-nullable column
    #[error("NOT NULL constraint violated on column '{column}'")]
    NotNull { column: String },

    /// CHECK predicate evaluated to false
    #[error("CHECK constraint '{constraint}' violated on column '{column}'")]
    Check { constraint: String, column: String },

    /// Referenced sink row does not exist
    #[error("FOREIGN KEY constraint '{constraint}' violated: no matching row in '{sink_table}'")]
    ForeignKey {
        constraint: String,
        sink_table: String,
    },

    /// Tuple has the wrong number of values
    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },

    /// Value does not match the declared column type
    #[error("column '{column}' expects {expected}, got {got}")]
    Type {
        column: String,
        expected: String,
        got: String,
    },
}

/// Storage operation errors.
///
/// Capacity exhaustion of a tile group or indirection array is never an error;
/// it is handled inside the allocator by retrying or growing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Constraint violation detected while validating a tuple
    #[error("Constraint violation in table '{table}': {kind}")]
    ConstraintViolation {
        table: String,
        kind: ConstraintErrorKind,
    },

    /// A visible or uncommitted entry with the same key already exists
    #[error("Duplicate key in index '{index}'")]
    IndexConflict { index: String },

    /// Another transaction owns the tuple version
    #[error("Tuple at {location} is owned by another transaction")]
    OwnershipConflict { location: ItemPointer },

    /// The tuple version is no longer the newest visible one
    #[error("Tuple at {location} is not visible to the transaction")]
    TupleNotVisible { location: ItemPointer },

    /// A RESTRICT / NO ACTION foreign key blocked the operation
    #[error("Foreign key '{constraint}' from table '{source_table}' restricts the operation")]
    ForeignKeyRestrict {
        constraint: String,
        source_table: String,
    },

    /// Cascading actions went deeper than the configured limit
    #[error("Foreign key cascade exceeded depth {depth}")]
    CascadeDepthExceeded { depth: usize },

    /// Table not found
    #[error("Table {0} not found")]
    TableNotFound(String),

    /// Table already exists
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Tile group not registered
    #[error("Tile group {0} not found")]
    TileGroupNotFound(Oid),

    /// Index not found on a table
    #[error("Index {index} not found in table '{table}'")]
    IndexNotFound { table: String, index: String },

    /// Schema or key definition is inconsistent
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Operation on a transaction that already finished
    #[error("Transaction {0} is not active")]
    TransactionNotActive(u64),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lock poisoned (RwLock or Mutex poisoned)
    #[error("Lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns `true` for errors raised by tuple validation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}
