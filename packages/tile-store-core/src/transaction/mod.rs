//! Transactions, visibility and the commit protocol for version chains.

mod manager;
mod rw_type;
#[allow(clippy::module_inception)]
mod transaction;
mod transaction_handle;

pub use manager::TransactionManager;
pub use rw_type::{ResultType, RwType, VisibilityType};
pub use transaction::{Transaction, TransactionState};
pub use transaction_handle::TransactionHandle;
