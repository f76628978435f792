//! Projection of updated rows: which columns an update writes and how each
//! new value is produced.

use std::fmt;
use std::sync::Arc;

use crate::types::{ColumnId, Tuple, Value};

/// Which input tuple a column reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleSide {
    /// The version being replaced
    Old,
    /// A second input, e.g. the changed sink row of a cascade
    Right,
}

/// Expression producing the new value of one target column.
#[derive(Clone)]
pub enum TargetExpr {
    Constant(Value),
    Column { side: TupleSide, column: ColumnId },
    /// Computed from the version being replaced
    Derived(Arc<dyn Fn(&Tuple) -> Value + Send + Sync>),
}

impl TargetExpr {
    pub fn constant(value: impl Into<Value>) -> Self {
        TargetExpr::Constant(value.into())
    }

    pub fn derived<F>(f: F) -> Self
    where
        F: Fn(&Tuple) -> Value + Send + Sync + 'static,
    {
        TargetExpr::Derived(Arc::new(f))
    }

    /// Evaluates against the old version and an optional right input.
    /// A `Right` reference without a right input yields NULL.
    pub fn evaluate(&self, old: &Tuple, right: Option<&Tuple>) -> Value {
        match self {
            TargetExpr::Constant(value) => value.clone(),
            TargetExpr::Column {
                side: TupleSide::Old,
                column,
            } => old.value(*column).clone(),
            TargetExpr::Column {
                side: TupleSide::Right,
                column,
            } => right.map(|r| r.value(*column).clone()).unwrap_or(Value::Null),
            TargetExpr::Derived(f) => f(old),
        }
    }
}

impl fmt::Debug for TargetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetExpr::Constant(value) => write!(f, "Constant({})", value),
            TargetExpr::Column { side, column } => write!(f, "Column({:?}.{})", side, column),
            TargetExpr::Derived(_) => write!(f, "Derived(..)"),
        }
    }
}

/// Target list plus the direct column map of an update.
///
/// Targets compute written columns; the direct map copies the rest from the
/// old version (or the right input) unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    targets: Vec<(ColumnId, TargetExpr)>,
    direct_map: Vec<(ColumnId, (TupleSide, ColumnId))>,
}

impl ProjectInfo {
    pub fn new(
        targets: Vec<(ColumnId, TargetExpr)>,
        direct_map: Vec<(ColumnId, (TupleSide, ColumnId))>,
    ) -> Self {
        Self { targets, direct_map }
    }

    /// Update projection: `targets` are written, every other column of a
    /// `column_count`-wide row is copied from the old version.
    pub fn for_update(column_count: usize, targets: Vec<(ColumnId, TargetExpr)>) -> Self {
        let direct_map = (0..column_count)
            .filter(|column| !targets.iter().any(|(target, _)| target == column))
            .map(|column| (column, (TupleSide::Old, column)))
            .collect();
        Self { targets, direct_map }
    }

    /// Update projection assigning constants.
    pub fn assign(column_count: usize, values: Vec<(ColumnId, Value)>) -> Self {
        Self::for_update(
            column_count,
            values
                .into_iter()
                .map(|(column, value)| (column, TargetExpr::Constant(value)))
                .collect(),
        )
    }

    pub fn targets(&self) -> &[(ColumnId, TargetExpr)] {
        &self.targets
    }

    pub fn direct_map(&self) -> &[(ColumnId, (TupleSide, ColumnId))] {
        &self.direct_map
    }

    /// Columns written by the targets.
    pub fn target_columns(&self) -> Vec<ColumnId> {
        self.targets.iter().map(|(column, _)| *column).collect()
    }

    /// Fills `new` from the direct map, then the targets.
    pub fn evaluate(&self, new: &mut Tuple, old: &Tuple, right: Option<&Tuple>) {
        for (dest, (side, src)) in &self.direct_map {
            let value = match side {
                TupleSide::Old => old.value(*src).clone(),
                TupleSide::Right => right.map(|r| r.value(*src).clone()).unwrap_or(Value::Null),
            };
            new.set_value(*dest, value);
        }
        for (dest, expr) in &self.targets {
            new.set_value(*dest, expr.evaluate(old, right));
        }
    }
}
