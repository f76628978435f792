//! In-flight tuples passed into and out of storage.

use std::fmt;

use super::schema::ColumnId;
use super::value::Value;

/// A row of column values in schema order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// A tuple of `column_count` NULLs, filled in later by a projection.
    pub fn empty(column_count: usize) -> Self {
        Self {
            values: vec![Value::Null; column_count],
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Returns the value at `column`, or `Value::Null` if out of range.
    pub fn value(&self, column: ColumnId) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }

    pub fn set_value(&mut self, column: ColumnId, value: Value) {
        if column < self.values.len() {
            self.values[column] = value;
        }
    }

    /// Extracts the values of `columns` in order, e.g. to build an index key.
    pub fn key(&self, columns: &[ColumnId]) -> Vec<Value> {
        columns.iter().map(|&c| self.value(c).clone()).collect()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}
