//! Table schema: columns and column-level CHECK constraints.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::StoreError;

/// Zero-based column position within a schema.
pub type ColumnId = usize;

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Integer,
    /// Variable length string with a maximum byte length
    Varchar { max_len: usize },
}

impl ColumnType {
    /// Returns whether `value` can be stored in a column of this type.
    /// NULL is accepted here; nullability is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Boolean, Value::Boolean(_)) => true,
            (ColumnType::Integer, Value::Integer(_)) => true,
            (ColumnType::Varchar { max_len }, Value::Varchar(s)) => s.len() <= *max_len,
            _ => false,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ColumnType::Boolean => "boolean".to_string(),
            ColumnType::Integer => "integer".to_string(),
            ColumnType::Varchar { max_len } => format!("varchar({})", max_len),
        }
    }
}

/// Column definition within a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type
    pub column_type: ColumnType,
    /// Whether NULL is allowed
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
        }
    }

    /// Shorthand for a non-nullable integer column.
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer, false)
    }

    /// Shorthand for a nullable varchar column.
    pub fn varchar(name: impl Into<String>, max_len: usize) -> Self {
        Self::new(name, ColumnType::Varchar { max_len }, true)
    }
}

/// Comparison operator of a CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// `CHECK (column <op> operand)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub column: ColumnId,
    pub op: CompareOp,
    pub operand: Value,
}

impl CheckConstraint {
    pub fn new(name: impl Into<String>, column: ColumnId, op: CompareOp, operand: Value) -> Self {
        Self {
            name: name.into(),
            column,
            op,
            operand,
        }
    }

    /// Evaluates the predicate. NULL satisfies every CHECK, as in SQL.
    pub fn evaluate(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        // values of different types never compare equal
        if std::mem::discriminant(value) != std::mem::discriminant(&self.operand) {
            return false;
        }
        let ord = value.cmp(&self.operand);
        match self.op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::NotEq => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
        }
    }
}

/// Table schema with columns in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
    checks: Vec<CheckConstraint>,
}

impl Schema {
    /// Creates a schema, rejecting duplicate column names.
    pub fn new(columns: Vec<Column>) -> Result<Self, StoreError> {
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(StoreError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }
        Ok(Self {
            columns,
            checks: Vec::new(),
        })
    }

    /// Adds a CHECK constraint.
    pub fn with_check(mut self, check: CheckConstraint) -> Result<Self, StoreError> {
        if check.column >= self.columns.len() {
            return Err(StoreError::InvalidSchema(format!(
                "check '{}' references column {} of {}",
                check.name,
                check.column,
                self.columns.len()
            )));
        }
        self.checks.push(check);
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn checks(&self) -> &[CheckConstraint] {
        &self.checks
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id)
    }

    /// Returns the position of the named column.
    pub fn column_id(&self, name: &str) -> Option<ColumnId> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Resolves column names to ids, in the given order.
    pub fn column_ids(&self, names: &[&str]) -> Result<Vec<ColumnId>, StoreError> {
        names
            .iter()
            .map(|name| {
                self.column_id(name).ok_or_else(|| {
                    StoreError::InvalidSchema(format!("unknown column '{}'", name))
                })
            })
            .collect()
    }

    /// Builds a key schema from a subset of columns, keeping the given order.
    pub fn project(&self, ids: &[ColumnId]) -> Result<Schema, StoreError> {
        let columns = ids
            .iter()
            .map(|&id| {
                self.columns
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::InvalidSchema(format!("unknown column {}", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Schema {
            columns,
            checks: Vec::new(),
        })
    }
}
