//! Garbage collection of dead tuple versions and slot recycling.
//!
//! The transaction manager hands every version it retires to a
//! [`GcProvider`]; tables ask the provider for a recycled slot before
//! allocating fresh space.

mod vacuum;

pub use vacuum::VacuumGc;

use crate::storage::{Cid, ItemPointer, Oid};

/// Why a version was retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GcVersionType {
    /// Committed version replaced by a newer committed one
    CommitUpdate,
    /// Committed version ended by a committed tombstone
    CommitDelete,
    /// Row inserted and deleted by the same committed transaction
    CommitInsDel,
    /// New version of an aborted update
    AbortUpdate,
    /// Tombstone of an aborted delete
    AbortDelete,
    /// Row inserted by an aborted transaction
    AbortInsert,
}

impl GcVersionType {
    /// Retiring this version removes the whole row, not just one version.
    pub fn ends_row(&self) -> bool {
        matches!(
            self,
            GcVersionType::CommitDelete | GcVersionType::CommitInsDel | GcVersionType::AbortInsert
        )
    }
}

/// Slot recycling provider consulted by tables and the transaction manager.
pub trait GcProvider: Send + Sync {
    /// Starts tracking free slots of a table.
    fn register_table(&self, table_oid: Oid);

    /// Forgets a dropped table and everything queued for it.
    fn deregister_table(&self, table_oid: Oid);

    /// Pops a reclaimed slot of `table_oid`, if any.
    fn return_free_slot(&self, table_oid: Oid) -> Option<ItemPointer>;

    /// Queues a retired version; it is reclaimed once no transaction with a
    /// snapshot older than `cid` is running.
    fn recycle_old_tuple_slot(&self, table_oid: Oid, location: ItemPointer, cid: Cid, kind: GcVersionType);

    /// Takes back a slot that was never made reachable, e.g. after a failed
    /// insert whose index entries were already retracted.
    fn recycle_invalid_tuple_slot(&self, table_oid: Oid, location: ItemPointer);
}

/// Provider that never recycles anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGc;

impl GcProvider for NoopGc {
    fn register_table(&self, _table_oid: Oid) {}

    fn deregister_table(&self, _table_oid: Oid) {}

    fn return_free_slot(&self, _table_oid: Oid) -> Option<ItemPointer> {
        None
    }

    fn recycle_old_tuple_slot(&self, _table_oid: Oid, _location: ItemPointer, _cid: Cid, _kind: GcVersionType) {}

    fn recycle_invalid_tuple_slot(&self, _table_oid: Oid, _location: ItemPointer) {}
}
