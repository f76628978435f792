//! Value, tuple and schema types shared by every storage component.

mod schema;
mod tuple;
mod value;

pub use schema::{CheckConstraint, Column, ColumnId, ColumnType, CompareOp, Schema};
pub use tuple::Tuple;
pub use value::Value;
