//! Referential actions on rows that reference a changed sink row.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use super::delete::delete_row;
use super::update::update_row;
use super::ExecutionContext;
use crate::error::StoreError;
use crate::expression::{ProjectInfo, TargetExpr, TupleSide};
use crate::storage::{ItemPointer, Oid};
use crate::table::{DataTable, ForeignKey};
use crate::transaction::Transaction;
use crate::types::{Tuple, Value};

/// Recursion guard for cascading actions: a depth bound plus the row
/// versions already touched by this statement.
#[derive(Debug)]
pub(super) struct CascadeState {
    depth: usize,
    max_depth: usize,
    visited: HashSet<(Oid, ItemPointer)>,
}

impl CascadeState {
    pub(super) fn new(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited: HashSet::new(),
        }
    }

    pub(super) fn visit(&mut self, table_oid: Oid, location: ItemPointer) -> bool {
        self.visited.insert((table_oid, location))
    }

    fn is_visited(&self, table_oid: Oid, location: ItemPointer) -> bool {
        self.visited.contains(&(table_oid, location))
    }

    fn descend(&mut self) -> Result<(), StoreError> {
        if self.depth >= self.max_depth {
            return Err(StoreError::CascadeDepthExceeded {
                depth: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Rows of the foreign key's source table visible to `txn` that reference
/// `key`, excluding versions this statement already produced.
fn referencing_rows(
    ctx: &ExecutionContext<'_>,
    fk: &ForeignKey,
    key: &[Value],
    txn: &Transaction,
    state: &CascadeState,
) -> Result<(Arc<DataTable>, Vec<(ItemPointer, Tuple)>), StoreError> {
    let source = ctx.catalog.get_table(fk.source_table_oid)?;
    let rows = source
        .find_visible(&fk.source_columns, key, txn, ctx.txn_manager)?
        .into_iter()
        .filter(|(location, _)| !state.is_visited(source.oid(), *location))
        .collect();
    Ok((source, rows))
}

fn restricted(fk: &ForeignKey, source: &DataTable) -> StoreError {
    debug!(constraint = %fk.name, source_table = source.name(), "foreign key restricts change");
    StoreError::ForeignKeyRestrict {
        constraint: fk.name.clone(),
        source_table: source.name().to_string(),
    }
}

/// Projection for a referencing row that copies the changed sink row's key
/// columns into the foreign key's source columns.
fn key_projection(fk: &ForeignKey, column_count: usize) -> ProjectInfo {
    let targets = fk
        .source_columns
        .iter()
        .zip(&fk.sink_columns)
        .map(|(&source, &sink)| {
            (
                source,
                TargetExpr::Column {
                    side: TupleSide::Right,
                    column: sink,
                },
            )
        })
        .collect();
    ProjectInfo::for_update(column_count, targets)
}

/// Applies `ON UPDATE` actions after a row of `sink` changed from `old` to
/// `new`.
pub(super) fn on_sink_update(
    ctx: &ExecutionContext<'_>,
    sink: &DataTable,
    old: &Tuple,
    new: &Tuple,
    txn: &mut Transaction,
    state: &mut CascadeState,
) -> Result<(), StoreError> {
    for fk in sink.foreign_key_sources()? {
        let old_key = fk.sink_key(old);
        let new_key = fk.sink_key(new);
        if old_key == new_key || old_key.iter().any(Value::is_null) {
            continue;
        }
        let (source, rows) = referencing_rows(ctx, &fk, &old_key, txn, state)?;
        if rows.is_empty() {
            continue;
        }
        if fk.on_update.blocks() {
            return Err(restricted(&fk, &source));
        }
        let project = key_projection(&fk, source.schema().column_count());
        state.descend()?;
        for (location, _) in rows {
            update_row(ctx, &source, location, &project, Some(new), txn, state)?;
        }
        state.ascend();
    }
    Ok(())
}

/// Applies `ON DELETE` actions after `old` was deleted from `sink`.
pub(super) fn on_sink_delete(
    ctx: &ExecutionContext<'_>,
    sink: &DataTable,
    old: &Tuple,
    txn: &mut Transaction,
    state: &mut CascadeState,
) -> Result<(), StoreError> {
    for fk in sink.foreign_key_sources()? {
        let key = fk.sink_key(old);
        if key.iter().any(Value::is_null) {
            continue;
        }
        let (source, rows) = referencing_rows(ctx, &fk, &key, txn, state)?;
        if rows.is_empty() {
            continue;
        }
        if fk.on_delete.blocks() {
            return Err(restricted(&fk, &source));
        }
        state.descend()?;
        for (location, _) in rows {
            delete_row(ctx, &source, location, txn, state)?;
        }
        state.ascend();
    }
    Ok(())
}
