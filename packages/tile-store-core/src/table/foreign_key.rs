//! Foreign key constraint descriptors.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::Oid;
use crate::types::{ColumnId, Tuple, Value};

/// Referential action applied when a referenced (sink) row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FkAction {
    /// Fail if referencing rows exist
    #[default]
    NoAction,
    /// Fail if referencing rows exist
    Restrict,
    /// Propagate the change to referencing rows
    Cascade,
}

impl FkAction {
    /// Returns `true` if referencing rows block the operation.
    pub fn blocks(&self) -> bool {
        matches!(self, FkAction::NoAction | FkAction::Restrict)
    }
}

/// `source(source_columns) REFERENCES sink(sink_columns)`.
///
/// Registered on the source table as an outgoing constraint and on the sink
/// table as an incoming reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Referencing table
    pub source_table_oid: Oid,
    /// Referencing columns, paired with `sink_columns` by position
    pub source_columns: Vec<ColumnId>,
    /// Referenced table
    pub sink_table_oid: Oid,
    /// Referenced columns
    pub sink_columns: Vec<ColumnId>,
    pub on_update: FkAction,
    pub on_delete: FkAction,
}

impl ForeignKey {
    /// Creates a foreign key descriptor.
    ///
    /// # Returns
    /// `StoreError::InvalidSchema` if the column lists are empty or differ in length.
    pub fn new(
        name: impl Into<String>,
        source_table_oid: Oid,
        source_columns: Vec<ColumnId>,
        sink_table_oid: Oid,
        sink_columns: Vec<ColumnId>,
        on_update: FkAction,
        on_delete: FkAction,
    ) -> Result<Self, StoreError> {
        let name = name.into();
        if source_columns.is_empty() || source_columns.len() != sink_columns.len() {
            return Err(StoreError::InvalidSchema(format!(
                "foreign key '{}' pairs {} source columns with {} sink columns",
                name,
                source_columns.len(),
                sink_columns.len()
            )));
        }
        Ok(Self {
            name,
            source_table_oid,
            source_columns,
            sink_table_oid,
            sink_columns,
            on_update,
            on_delete,
        })
    }

    /// Key this referencing row points at.
    pub fn source_key(&self, tuple: &Tuple) -> Vec<Value> {
        tuple.key(&self.source_columns)
    }

    /// Key referencing rows use to point at this sink row.
    pub fn sink_key(&self, tuple: &Tuple) -> Vec<Value> {
        tuple.key(&self.sink_columns)
    }

    /// Returns `true` if any source column is in `columns`.
    pub fn touches_source(&self, columns: &[ColumnId]) -> bool {
        self.source_columns.iter().any(|c| columns.contains(c))
    }
}
