use super::ExecutionContext;
use crate::error::StoreError;
use crate::index::Index;
use crate::storage::ItemPointer;
use crate::table::DataTable;
use crate::transaction::Transaction;
use crate::types::{Tuple, Value};

/// Rows of `table` visible to `txn` whose `index` key equals `key`.
///
/// Entries are resolved through their indirection cells; a version whose
/// key no longer matches (the entry is stale until collected) is skipped.
pub fn lookup_visible(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    index: &Index,
    key: &[Value],
    txn: &Transaction,
) -> Result<Vec<(ItemPointer, Tuple)>, StoreError> {
    let mut rows = Vec::new();
    for cell in index.scan_key(key)? {
        if let Some((location, tuple)) = table.visible_version(cell.location(), txn, ctx.txn_manager) {
            if index.key_of(&tuple) == key {
                rows.push((location, tuple));
            }
        }
    }
    Ok(rows)
}

/// Every row of `table` visible to `txn`.
pub fn scan_visible(
    ctx: &ExecutionContext<'_>,
    table: &DataTable,
    txn: &Transaction,
) -> Result<Vec<(ItemPointer, Tuple)>, StoreError> {
    table.scan_visible(txn, ctx.txn_manager)
}
