//! Optimistic MVCC transaction manager over newest-to-oldest version chains.
//!
//! The indirection cell of a row always points at its newest version; a
//! reader starts there and follows `prev` until it finds the version its
//! snapshot sees. Writers claim the newest committed version by swapping its
//! owner from `INITIAL_TXN_ID` to their own id, then link a new version in
//! front of it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::gc::{GcProvider, GcVersionType};
use crate::storage::{
    Cid, ItemPointer, Oid, TileGroup, TileGroupHeader, TileGroupLocator, TxnId, INITIAL_TXN_ID,
    INVALID_CID, INVALID_TXN_ID, MAX_CID,
};

use super::rw_type::{ResultType, RwType, VisibilityType};
use super::transaction::{Transaction, TransactionState};

pub struct TransactionManager {
    locator: Arc<TileGroupLocator>,
    gc: Arc<dyn GcProvider>,
    next_txn_id: AtomicU64,
    next_cid: AtomicU64,
    /// Active transactions and their snapshot ids
    active: Mutex<BTreeMap<TxnId, Cid>>,
}

impl TransactionManager {
    pub fn new(locator: Arc<TileGroupLocator>, gc: Arc<dyn GcProvider>) -> Self {
        Self {
            locator,
            gc,
            next_txn_id: AtomicU64::new(INITIAL_TXN_ID + 1),
            next_cid: AtomicU64::new(1),
            active: Mutex::new(BTreeMap::new()),
        }
    }

    /// Starts a transaction with a fresh id and snapshot.
    pub fn begin_transaction(&self) -> Result<Transaction, StoreError> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::AcqRel);
        let mut active = self.active.lock().map_err(|_| StoreError::LockPoisoned)?;
        // taken under the lock so oldest_active_cid never misses a snapshot
        let read_id = self.next_cid.fetch_add(1, Ordering::AcqRel);
        active.insert(txn_id, read_id);
        debug!(txn_id, read_id, "begin transaction");
        Ok(Transaction::new(txn_id, read_id))
    }

    /// Smallest snapshot id of any active transaction, or the next commit id
    /// if none is running. Versions ended before this id are unreachable.
    pub fn oldest_active_cid(&self) -> Result<Cid, StoreError> {
        let active = self.active.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(active
            .values()
            .min()
            .copied()
            .unwrap_or_else(|| self.next_cid.load(Ordering::Acquire)))
    }

    pub fn active_transaction_count(&self) -> Result<usize, StoreError> {
        let active = self.active.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(active.len())
    }

    /// Decides what `txn` sees in `slot` of `tile_group`.
    pub fn is_visible(&self, txn: &Transaction, tile_group: &TileGroup, slot: Oid) -> VisibilityType {
        let header = tile_group.header();
        let tuple_txn_id = header.transaction_id(slot);
        let begin = header.begin_commit_id(slot);
        let end = header.end_commit_id(slot);

        let activated = txn.read_id() >= begin;
        let invalidated = txn.read_id() >= end;

        if tuple_txn_id == INVALID_TXN_ID {
            return if activated && !invalidated {
                VisibilityType::Deleted
            } else {
                VisibilityType::Invisible
            };
        }

        if tuple_txn_id == txn.txn_id() {
            if begin == MAX_CID && end != INVALID_CID {
                // own insert or own new version
                VisibilityType::Ok
            } else if end == INVALID_CID {
                VisibilityType::Deleted
            } else if header.next_item_pointer(slot).is_null() {
                // claimed but not replaced yet
                VisibilityType::Ok
            } else {
                // committed version this transaction is replacing
                VisibilityType::Invisible
            }
        } else if begin == MAX_CID {
            // someone else's uncommitted version
            VisibilityType::Invisible
        } else if activated && !invalidated {
            VisibilityType::Ok
        } else {
            VisibilityType::Invisible
        }
    }

    /// Returns `true` if the version at `location` blocks another entry with
    /// the same unique key: it is visible to `txn`, uncommitted by another
    /// transaction, or committed and not yet ended.
    pub fn is_occupied(&self, txn: &Transaction, location: ItemPointer) -> bool {
        let Ok(tile_group) = self.locator.get_tile_group(location.block) else {
            return false;
        };
        let header = tile_group.header();
        if !header.contains(location.offset) {
            return false;
        }
        let slot = location.offset;
        let tuple_txn_id = header.transaction_id(slot);
        let begin = header.begin_commit_id(slot);
        let end = header.end_commit_id(slot);

        if tuple_txn_id == INVALID_TXN_ID {
            return false;
        }
        if tuple_txn_id == txn.txn_id() {
            return begin == MAX_CID && end != INVALID_CID;
        }
        if begin == MAX_CID {
            // dirty insert or update is occupied, dirty delete is not
            return end != INVALID_CID;
        }
        // committed: occupied unless it ended before the snapshot
        end == MAX_CID || txn.read_id() < end
    }

    pub fn is_owner(&self, txn: &Transaction, header: &TileGroupHeader, slot: Oid) -> bool {
        header.transaction_id(slot) == txn.txn_id()
    }

    /// Owner and the version is this transaction's own uncommitted one.
    pub fn is_written(&self, txn: &Transaction, header: &TileGroupHeader, slot: Oid) -> bool {
        self.is_owner(txn, header, slot) && header.begin_commit_id(slot) == MAX_CID
    }

    /// Committed, unowned and still the newest version.
    pub fn is_ownable(&self, _txn: &Transaction, header: &TileGroupHeader, slot: Oid) -> bool {
        header.transaction_id(slot) == INITIAL_TXN_ID && header.end_commit_id(slot) == MAX_CID
    }

    /// Claims the version for `txn`.
    ///
    /// # Returns
    /// `false` if another transaction owns it or it was superseded meanwhile.
    pub fn acquire_ownership(&self, txn: &Transaction, header: &TileGroupHeader, slot: Oid) -> bool {
        if !header.set_atomic_transaction_id(slot, INITIAL_TXN_ID, txn.txn_id()) {
            return false;
        }
        if header.end_commit_id(slot) != MAX_CID {
            // a committer ended this version between our check and the swap
            header.set_transaction_id(slot, INITIAL_TXN_ID);
            return false;
        }
        true
    }

    /// Releases a version claimed by `acquire_ownership` without writing it.
    pub fn yield_ownership(&self, txn: &Transaction, header: &TileGroupHeader, slot: Oid) {
        header.set_atomic_transaction_id(slot, txn.txn_id(), INITIAL_TXN_ID);
    }

    /// Records a freshly inserted version in the write set.
    pub fn perform_insert(&self, txn: &mut Transaction, location: ItemPointer) -> Result<(), StoreError> {
        self.ensure_active(txn)?;
        let tile_group = self.locator.get_tile_group(location.block)?;
        let header = tile_group.header();
        header.set_transaction_id(location.offset, txn.txn_id());
        header.set_begin_commit_id(location.offset, MAX_CID);
        header.set_end_commit_id(location.offset, MAX_CID);
        txn.record_insert(location);
        Ok(())
    }

    /// Links `new_location` in front of the owned version `old_location` and
    /// points the row's indirection cell at it.
    pub fn perform_update(
        &self,
        txn: &mut Transaction,
        old_location: ItemPointer,
        new_location: ItemPointer,
    ) -> Result<(), StoreError> {
        self.link_new_version(txn, old_location, new_location, MAX_CID)?;
        txn.record_update(old_location);
        Ok(())
    }

    /// Update of a version the transaction already wrote; nothing to link.
    pub fn perform_update_in_place(&self, txn: &Transaction, location: ItemPointer) -> Result<(), StoreError> {
        self.ensure_active(txn)?;
        let tile_group = self.locator.get_tile_group(location.block)?;
        if !self.is_written(txn, tile_group.header(), location.offset) {
            return Err(StoreError::OwnershipConflict { location });
        }
        Ok(())
    }

    /// Ends the owned version `old_location` with the tombstone at
    /// `tombstone`.
    pub fn perform_delete(
        &self,
        txn: &mut Transaction,
        old_location: ItemPointer,
        tombstone: ItemPointer,
    ) -> Result<(), StoreError> {
        self.link_new_version(txn, old_location, tombstone, INVALID_CID)?;
        txn.record_delete(old_location);
        Ok(())
    }

    /// Deletes a version the transaction itself wrote.
    pub fn perform_delete_in_place(&self, txn: &mut Transaction, location: ItemPointer) -> Result<(), StoreError> {
        self.ensure_active(txn)?;
        let tile_group = self.locator.get_tile_group(location.block)?;
        let header = tile_group.header();
        if !self.is_written(txn, header, location.offset) {
            return Err(StoreError::OwnershipConflict { location });
        }
        header.set_end_commit_id(location.offset, INVALID_CID);

        let prev = header.prev_item_pointer(location.offset);
        if prev.is_null() {
            txn.record_delete(location);
        } else {
            // own new version of an updated row: the delete applies to the
            // committed version the update replaced
            txn.record_delete(prev);
        }
        Ok(())
    }

    fn link_new_version(
        &self,
        txn: &Transaction,
        old_location: ItemPointer,
        new_location: ItemPointer,
        new_end: Cid,
    ) -> Result<(), StoreError> {
        self.ensure_active(txn)?;
        let old_group = self.locator.get_tile_group(old_location.block)?;
        let new_group = self.locator.get_tile_group(new_location.block)?;
        let old_header = old_group.header();
        let new_header = new_group.header();

        if !self.is_owner(txn, old_header, old_location.offset) {
            return Err(StoreError::OwnershipConflict {
                location: old_location,
            });
        }

        let cell = old_header.indirection(old_location.offset);
        new_header.set_transaction_id(new_location.offset, txn.txn_id());
        new_header.set_begin_commit_id(new_location.offset, MAX_CID);
        new_header.set_end_commit_id(new_location.offset, new_end);
        new_header.set_prev_item_pointer(new_location.offset, old_location);
        new_header.set_next_item_pointer(new_location.offset, ItemPointer::INVALID);
        new_header.set_indirection(new_location.offset, cell.clone());
        old_header.set_next_item_pointer(old_location.offset, new_location);

        // publish last so readers only reach a fully linked version
        if let Some(cell) = cell {
            cell.set_location(new_location);
        }
        Ok(())
    }

    /// Records the outcome of an operation; `Failure` makes commit abort.
    pub fn set_transaction_result(&self, txn: &mut Transaction, result: ResultType) {
        txn.set_result(result);
    }

    /// Commits `txn`, or aborts it if an operation reported failure.
    ///
    /// # Returns
    /// `ResultType::Success` if committed, `ResultType::Aborted` otherwise.
    pub fn commit_transaction(&self, txn: &mut Transaction) -> Result<ResultType, StoreError> {
        self.ensure_active(txn)?;
        if txn.result() == ResultType::Failure {
            return self.abort_transaction(txn);
        }

        let commit_id = self.next_cid.fetch_add(1, Ordering::AcqRel);
        txn.set_commit_id(commit_id);

        for (location, rw_type) in txn.take_rw_set() {
            let Some(group) = self.resolve(location) else {
                continue;
            };
            let header = group.header();
            let slot = location.offset;
            match rw_type {
                RwType::Insert => {
                    header.set_begin_commit_id(slot, commit_id);
                    header.set_end_commit_id(slot, MAX_CID);
                    header.set_transaction_id(slot, INITIAL_TXN_ID);
                }
                RwType::InsDel => {
                    header.set_begin_commit_id(slot, commit_id);
                    header.set_end_commit_id(slot, commit_id);
                    header.set_transaction_id(slot, INVALID_TXN_ID);
                    self.gc.recycle_old_tuple_slot(
                        group.table_oid(),
                        location,
                        commit_id,
                        GcVersionType::CommitInsDel,
                    );
                }
                RwType::Update | RwType::Delete => {
                    let newer = header.next_item_pointer(slot);
                    let deleted = rw_type == RwType::Delete;
                    if let Some(newer_group) = self.resolve(newer) {
                        let newer_header = newer_group.header();
                        newer_header.set_begin_commit_id(newer.offset, commit_id);
                        newer_header.set_end_commit_id(
                            newer.offset,
                            if deleted { commit_id } else { MAX_CID },
                        );
                        newer_header.set_transaction_id(
                            newer.offset,
                            if deleted { INVALID_TXN_ID } else { INITIAL_TXN_ID },
                        );
                    }
                    header.set_end_commit_id(slot, commit_id);
                    header.set_transaction_id(slot, INITIAL_TXN_ID);
                    self.gc.recycle_old_tuple_slot(
                        group.table_oid(),
                        location,
                        commit_id,
                        if deleted {
                            GcVersionType::CommitDelete
                        } else {
                            GcVersionType::CommitUpdate
                        },
                    );
                }
            }
        }

        self.finish(txn, TransactionState::Committed)?;
        debug!(txn_id = txn.txn_id(), commit_id, "commit transaction");
        Ok(ResultType::Success)
    }

    /// Rolls back every write of `txn` and restores indirection cells to the
    /// versions they pointed at before the transaction.
    pub fn abort_transaction(&self, txn: &mut Transaction) -> Result<ResultType, StoreError> {
        self.ensure_active(txn)?;
        let abort_id = self.next_cid.fetch_add(1, Ordering::AcqRel);

        for (location, rw_type) in txn.take_rw_set() {
            let Some(group) = self.resolve(location) else {
                continue;
            };
            let header = group.header();
            let slot = location.offset;
            match rw_type {
                RwType::Insert | RwType::InsDel => {
                    header.set_transaction_id(slot, INVALID_TXN_ID);
                    self.gc.recycle_old_tuple_slot(
                        group.table_oid(),
                        location,
                        abort_id,
                        GcVersionType::AbortInsert,
                    );
                }
                RwType::Update | RwType::Delete => {
                    let newer = header.next_item_pointer(slot);
                    if let Some(cell) = header.indirection(slot) {
                        cell.set_location(location);
                    }
                    header.set_next_item_pointer(slot, ItemPointer::INVALID);
                    if let Some(newer_group) = self.resolve(newer) {
                        newer_group
                            .header()
                            .set_transaction_id(newer.offset, INVALID_TXN_ID);
                        self.gc.recycle_old_tuple_slot(
                            newer_group.table_oid(),
                            newer,
                            abort_id,
                            if rw_type == RwType::Delete {
                                GcVersionType::AbortDelete
                            } else {
                                GcVersionType::AbortUpdate
                            },
                        );
                    }
                    header.set_transaction_id(slot, INITIAL_TXN_ID);
                }
            }
        }

        txn.set_result(ResultType::Aborted);
        self.finish(txn, TransactionState::Aborted)?;
        debug!(txn_id = txn.txn_id(), "abort transaction");
        Ok(ResultType::Aborted)
    }

    fn finish(&self, txn: &mut Transaction, state: TransactionState) -> Result<(), StoreError> {
        txn.set_state(state);
        let mut active = self.active.lock().map_err(|_| StoreError::LockPoisoned)?;
        active.remove(&txn.txn_id());
        Ok(())
    }

    fn ensure_active(&self, txn: &Transaction) -> Result<(), StoreError> {
        if txn.is_active() {
            Ok(())
        } else {
            Err(StoreError::TransactionNotActive(txn.txn_id()))
        }
    }

    fn resolve(&self, location: ItemPointer) -> Option<Arc<TileGroup>> {
        if location.is_null() {
            return None;
        }
        match self.locator.get_tile_group(location.block) {
            Ok(group) if group.header().contains(location.offset) => Some(group),
            Ok(_) => None,
            Err(e) => {
                warn!(%location, error = %e, "version location no longer resolvable");
                None
            }
        }
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("next_txn_id", &self.next_txn_id.load(Ordering::Relaxed))
            .field("next_cid", &self.next_cid.load(Ordering::Relaxed))
            .finish()
    }
}
