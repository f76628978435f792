use tracing::{debug, trace};

use super::cascade::{self, CascadeState};
use super::insert::insert_row;
use super::{ensure_active, record_outcome, ExecutionContext};
use crate::error::StoreError;
use crate::expression::ProjectInfo;
use crate::storage::{IndirectionCellRef, ItemPointer, TileGroup};
use crate::table::DataTable;
use crate::transaction::{Transaction, VisibilityType};
use crate::types::{ColumnId, Tuple};

/// Updates the row version at `location` with `project`.
///
/// `location` must be the version of the row visible to `txn`. Updates that
/// write primary key columns delete the row and insert it again under the
/// new key; other updates link a new version in front of the old one and
/// re-insert only into secondary indexes the update touches. A version the
/// transaction itself wrote is overwritten in place.
///
/// # Returns
/// Location of the row's new version; on error the transaction is marked
/// failed.
pub fn update(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    location: ItemPointer,
    project: &ProjectInfo,
    txn: &mut Transaction,
) -> Result<ItemPointer, StoreError> {
    let mut state = CascadeState::new(ctx.max_cascade_depth);
    let result = update_row(ctx, table, location, project, None, txn, &mut state);
    record_outcome(ctx, txn, result)
}

pub(super) fn update_row(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    location: ItemPointer,
    project: &ProjectInfo,
    right: Option<&Tuple>,
    txn: &mut Transaction,
    state: &mut CascadeState,
) -> Result<ItemPointer, StoreError> {
    ensure_active(txn)?;
    let tm = ctx.txn_manager;
    let group = table.get_tile_group_by_id(location.block)?;
    let header = group.header();
    let slot = location.offset;
    if !header.contains(slot) {
        return Err(StoreError::TupleNotVisible { location });
    }
    let old = group
        .read_tuple(slot)
        .ok_or(StoreError::TupleNotVisible { location })?;

    let targets = project.target_columns();
    let mut new = Tuple::empty(table.schema().column_count());
    project.evaluate(&mut new, &old, right);

    let pk_update = table
        .primary_key_index()?
        .is_some_and(|pk| pk.covers_any(&targets));

    let new_location = if tm.is_written(txn, header, slot) {
        if pk_update {
            tm.perform_delete_in_place(txn, location)?;
            insert_row(ctx, table, &new, txn)?
        } else {
            let cell = row_cell(&group, location)?;
            table.install_version(&new, &targets, &cell, txn, tm, ctx.catalog)?;
            table.retract_replaced_keys(&old, &new, location, &cell)?;
            group.copy_tuple(&new, slot);
            tm.perform_update_in_place(txn, location)?;
            location
        }
    } else {
        if tm.is_visible(txn, &group, slot) != VisibilityType::Ok {
            return Err(StoreError::TupleNotVisible { location });
        }
        if !tm.is_ownable(txn, header, slot) || !tm.acquire_ownership(txn, header, slot) {
            debug!(table = table.name(), %location, txn_id = txn.txn_id(), "update lost ownership race");
            return Err(StoreError::OwnershipConflict { location });
        }

        if pk_update {
            let tombstone = match table.insert_empty_version() {
                Ok(tombstone) => tombstone,
                Err(e) => {
                    tm.yield_ownership(txn, header, slot);
                    return Err(e);
                }
            };
            if let Err(e) = tm.perform_delete(txn, location, tombstone) {
                table.release_version(tombstone);
                tm.yield_ownership(txn, header, slot);
                return Err(e);
            }
            // the delete is recorded now, so an insert failure rolls back on abort
            insert_row(ctx, table, &new, txn)?
        } else {
            match install_new_version(ctx, table, &group, location, &new, &targets, txn) {
                Ok(new_location) => new_location,
                Err(e) => {
                    tm.yield_ownership(txn, header, slot);
                    return Err(e);
                }
            }
        }
    };

    trace!(
        table = table.name(),
        from = %location,
        to = %new_location,
        key_update = pk_update,
        "updated row"
    );

    state.visit(table.oid(), location);
    state.visit(table.oid(), new_location);
    cascade::on_sink_update(ctx, table, &old, &new, txn, state)?;
    Ok(new_location)
}

/// Non-key update of an owned committed version: fill a fresh slot,
/// validate it and link it in front of `location`.
fn install_new_version(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    group: &TileGroup,
    location: ItemPointer,
    new: &Tuple,
    targets: &[ColumnId],
    txn: &mut Transaction,
) -> Result<ItemPointer, StoreError> {
    let cell = row_cell(group, location)?;
    let new_location = table.acquire_version()?;
    if let Err(e) = fill_version(ctx, table, new_location, new, targets, &cell, txn) {
        table.release_version(new_location);
        return Err(e);
    }
    if let Err(e) = ctx.txn_manager.perform_update(txn, location, new_location) {
        table.release_version(new_location);
        return Err(e);
    }
    Ok(new_location)
}

fn fill_version(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    new_location: ItemPointer,
    new: &Tuple,
    targets: &[ColumnId],
    cell: &IndirectionCellRef,
    txn: &Transaction,
) -> Result<(), StoreError> {
    let new_group = table.get_tile_group_by_id(new_location.block)?;
    new_group.copy_tuple(new, new_location.offset);
    table.install_version(new, targets, cell, txn, ctx.txn_manager, ctx.catalog)
}

fn row_cell(group: &TileGroup, location: ItemPointer) -> Result<IndirectionCellRef, StoreError> {
    group
        .header()
        .indirection(location.offset)
        .ok_or(StoreError::TupleNotVisible { location })
}

