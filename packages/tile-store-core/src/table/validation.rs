//! Column-level constraint validation for tuples entering a table.

use crate::error::{ConstraintErrorKind, StoreError};
use crate::types::{Schema, Tuple};

fn violation(table: &str, kind: ConstraintErrorKind) -> StoreError {
    StoreError::ConstraintViolation {
        table: table.to_string(),
        kind,
    }
}

/// Validates arity, column types, NOT NULL and CHECK constraints.
///
/// # Arguments
/// * `table` - Table name, used in the error
/// * `schema` - Table schema
/// * `tuple` - Tuple to validate
///
/// # Returns
/// `Result<(), StoreError>` with the first violation found.
pub(crate) fn check_constraints(table: &str, schema: &Schema, tuple: &Tuple) -> Result<(), StoreError> {
    if tuple.column_count() != schema.column_count() {
        return Err(violation(
            table,
            ConstraintErrorKind::Arity {
                expected: schema.column_count(),
                got: tuple.column_count(),
            },
        ));
    }

    for (column, value) in schema.columns().iter().zip(tuple.values()) {
        if value.is_null() {
            if !column.nullable {
                return Err(violation(
                    table,
                    ConstraintErrorKind::NotNull {
                        column: column.name.clone(),
                    },
                ));
            }
            continue;
        }
        if !column.column_type.accepts(value) {
            return Err(violation(
                table,
                ConstraintErrorKind::Type {
                    column: column.name.clone(),
                    expected: column.column_type.name(),
                    got: value.type_name().to_string(),
                },
            ));
        }
    }

    for check in schema.checks() {
        if !check.evaluate(tuple.value(check.column)) {
            let column = schema
                .column(check.column)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            return Err(violation(
                table,
                ConstraintErrorKind::Check {
                    constraint: check.name.clone(),
                    column,
                },
            ));
        }
    }

    Ok(())
}
