use tracing::trace;

use super::{ensure_active, record_outcome, ExecutionContext};
use crate::error::StoreError;
use crate::storage::ItemPointer;
use crate::table::DataTable;
use crate::transaction::Transaction;
use crate::types::Tuple;

/// Inserts `tuple` into `table` as part of `txn`.
///
/// # Returns
/// Location of the new version; on error the transaction is marked failed.
pub fn insert(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    tuple: &Tuple,
    txn: &mut Transaction,
) -> Result<ItemPointer, StoreError> {
    let result = insert_row(ctx, table, tuple, txn);
    record_outcome(ctx, txn, result)
}

pub(super) fn insert_row(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    tuple: &Tuple,
    txn: &mut Transaction,
) -> Result<ItemPointer, StoreError> {
    ensure_active(txn)?;
    let location = table.insert_tuple(tuple, txn, ctx.txn_manager, ctx.catalog)?;
    ctx.txn_manager.perform_insert(txn, location)?;
    trace!(table = table.name(), %location, txn_id = txn.txn_id(), "inserted row");
    Ok(location)
}
