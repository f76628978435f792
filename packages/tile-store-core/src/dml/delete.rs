use tracing::{debug, trace};

use super::cascade::{self, CascadeState};
use super::{ensure_active, record_outcome, ExecutionContext};
use crate::error::StoreError;
use crate::storage::ItemPointer;
use crate::table::DataTable;
use crate::transaction::{Transaction, VisibilityType};

/// Deletes the row whose version visible to `txn` is at `location`.
///
/// A committed version is ended by linking an empty tombstone in front of
/// it; a version the transaction wrote itself is ended in place. Incoming
/// foreign keys are enforced afterwards.
pub fn delete(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    location: ItemPointer,
    txn: &mut Transaction,
) -> Result<(), StoreError> {
    let mut state = CascadeState::new(ctx.max_cascade_depth);
    let result = delete_row(ctx, table, location, txn, &mut state);
    record_outcome(ctx, txn, result)
}

pub(super) fn delete_row(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    location: ItemPointer,
    txn: &mut Transaction,
    state: &mut CascadeState,
) -> Result<(), StoreError> {
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

    if tm.is_written(txn, header, slot) {
        tm.perform_delete_in_place(txn, location)?;
    } else {
        if tm.is_visible(txn, &group, slot) != VisibilityType::Ok {
            return Err(StoreError::TupleNotVisible { location });
        }
        if !tm.is_ownable(txn, header, slot) || !tm.acquire_ownership(txn, header, slot) {
            debug!(table = table.name(), %location, txn_id = txn.txn_id(), "delete lost ownership race");
            return Err(StoreError::OwnershipConflict { location });
        }
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
    }

    trace!(table = table.name(), %location, txn_id = txn.txn_id(), "deleted row");
    state.visit(table.oid(), location);
    cascade::on_sink_delete(ctx, table, &old, txn, state)
}
