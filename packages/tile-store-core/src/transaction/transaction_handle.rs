use std::sync::Arc;

use tracing::warn;

use crate::error::StoreError;

use super::manager::TransactionManager;
use super::rw_type::ResultType;
use super::transaction::Transaction;

/// RAII guard for transaction handling with auto-abort on drop.
///
/// If the transaction is not explicitly committed or aborted, it is aborted
/// through its manager when the handle is dropped.
#[derive(Debug)]
pub struct TransactionHandle {
    manager: Arc<TransactionManager>,
    /// The transaction being managed
    transaction: Transaction,
    /// Whether to auto-abort on drop
    auto_abort: bool,
}

impl TransactionHandle {
    /// Begins a transaction on `manager`.
    pub fn begin(manager: Arc<TransactionManager>) -> Result<Self, StoreError> {
        let transaction = manager.begin_transaction()?;
        Ok(Self {
            manager,
            transaction,
            auto_abort: true,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn transaction_mut(&mut self) -> &mut Transaction {
        &mut self.transaction
    }

    /// Commits the transaction, or aborts it if an operation failed.
    ///
    /// # Returns
    /// `ResultType::Success` or `ResultType::Aborted`.
    pub fn commit(mut self) -> Result<ResultType, StoreError> {
        self.auto_abort = false;
        self.manager.commit_transaction(&mut self.transaction)
    }

    /// Rolls back the transaction.
    pub fn abort(mut self) -> Result<ResultType, StoreError> {
        self.auto_abort = false;
        self.manager.abort_transaction(&mut self.transaction)
    }

    pub fn txn_id(&self) -> u64 {
        self.transaction.txn_id()
    }

    pub fn is_committed(&self) -> bool {
        self.transaction.is_committed()
    }

    pub fn is_aborted(&self) -> bool {
        self.transaction.is_aborted()
    }

    pub fn is_active(&self) -> bool {
        self.transaction.is_active()
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        if self.auto_abort && self.transaction.is_active() {
            if let Err(e) = self.manager.abort_transaction(&mut self.transaction) {
                warn!(txn_id = self.transaction.txn_id(), error = %e, "auto-abort failed");
            }
        }
    }
}
