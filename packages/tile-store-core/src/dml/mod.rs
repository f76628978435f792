//! Version-chain operations executed on behalf of a transaction.
//!
//! Every operation reports failure to the transaction before returning the
//! error, so a later commit aborts instead of publishing partial work.

mod cascade;
mod delete;
mod insert;
mod lookup;
mod update;

pub use delete::delete;
pub use insert::insert;
pub use lookup::{lookup_visible, scan_visible};
pub use update::update;

use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::transaction::{ResultType, Transaction, TransactionManager};

/// Collaborators an operation needs besides the table it targets.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub catalog: &'a Catalog,
    pub txn_manager: &'a TransactionManager,
    /// Deepest chain of cascading foreign key actions
    pub max_cascade_depth: usize,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(catalog: &'a Catalog, txn_manager: &'a TransactionManager, max_cascade_depth: usize) -> Self {
        Self {
            catalog,
            txn_manager,
            max_cascade_depth,
        }
    }
}

/// Marks `txn` failed when `result` is an error.
fn record_outcome<T>(
    ctx: &ExecutionContext<'_>,
    txn: &mut Transaction,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    if result.is_err() && txn.is_active() {
        ctx.txn_manager.set_transaction_result(txn, ResultType::Failure);
    }
    result
}

fn ensure_active(txn: &Transaction) -> Result<(), StoreError> {
    if txn.is_active() {
        Ok(())
    } else {
        Err(StoreError::TransactionNotActive(txn.txn_id()))
    }
}
