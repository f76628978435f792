//! Vacuum-style collector: unlink expired versions, reclaim their slots and
//! index entries, then queue the slots for reuse by their table.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use super::{GcProvider, GcVersionType};
use crate::catalog::Catalog;
use crate::error::StoreError;
use crate::storage::{Cid, IndirectionCellRef, ItemPointer, Oid, TileGroupLocator};
use crate::table::DataTable;
use crate::types::Tuple;

#[derive(Debug, Clone, Copy)]
struct GcEntry {
    table_oid: Oid,
    location: ItemPointer,
    cid: Cid,
    kind: GcVersionType,
}

pub struct VacuumGc {
    locator: Arc<TileGroupLocator>,
    /// Upper bound of versions reclaimed by one `collect` pass
    max_attempts: usize,
    pending: Mutex<Vec<GcEntry>>,
    free_slots: Mutex<HashMap<Oid, VecDeque<ItemPointer>>>,
}

impl VacuumGc {
    pub fn new(locator: Arc<TileGroupLocator>, max_attempts: usize) -> Self {
        Self {
            locator,
            max_attempts,
            pending: Mutex::new(Vec::new()),
            free_slots: Mutex::new(HashMap::new()),
        }
    }

    /// Versions waiting for their snapshot horizon to pass.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Reclaimed slots ready for reuse by `table_oid`.
    pub fn free_slot_count(&self, table_oid: Oid) -> usize {
        self.free_slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(&table_oid).map(VecDeque::len))
            .unwrap_or(0)
    }

    /// Reclaims every queued version retired before `max_cid`.
    ///
    /// # Arguments
    /// * `catalog` - Resolves table oids to their indexes
    /// * `max_cid` - Oldest snapshot id still in use
    ///
    /// # Returns
    /// Number of slots returned to the free queues.
    pub fn collect(&self, catalog: &Catalog, max_cid: Cid) -> Result<usize, StoreError> {
        let expired = self.unlink(max_cid)?;
        let mut reclaimed = 0;
        for entry in expired {
            let table = match catalog.get_table(entry.table_oid) {
                Ok(table) => table,
                Err(_) => {
                    trace!(table_oid = entry.table_oid, "skipping version of dropped table");
                    continue;
                }
            };
            reclaimed += self.reclaim(&table, &entry)?;
        }
        if reclaimed > 0 {
            debug!(reclaimed, max_cid, "garbage collection pass");
        }
        Ok(reclaimed)
    }

    fn unlink(&self, max_cid: Cid) -> Result<Vec<GcEntry>, StoreError> {
        let mut pending = self.pending.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut expired = Vec::new();
        let mut kept = Vec::with_capacity(pending.len());
        for entry in std::mem::take(&mut *pending) {
            if entry.cid < max_cid && expired.len() < self.max_attempts {
                expired.push(entry);
            } else {
                kept.push(entry);
            }
        }
        *pending = kept;
        Ok(expired)
    }

    fn reclaim(&self, table: &DataTable, entry: &GcEntry) -> Result<usize, StoreError> {
        let Ok(group) = self.locator.get_tile_group(entry.location.block) else {
            return Ok(0);
        };
        let header = group.header();
        let slot = entry.location.offset;
        if !header.contains(slot) {
            return Ok(0);
        }

        let cell = header.indirection(slot);
        if let (Some(cell), Some(tuple)) = (&cell, group.read_tuple(slot)) {
            self.retract_index_entries(table, cell, entry.location, &tuple, entry.kind.ends_row())?;
        }

        let mut slots = vec![entry.location];
        match entry.kind {
            GcVersionType::CommitUpdate => {
                let newer = header.next_item_pointer(slot);
                if let Ok(newer_group) = self.locator.get_tile_group(newer.block) {
                    if newer_group.header().contains(newer.offset) {
                        newer_group
                            .header()
                            .set_prev_item_pointer(newer.offset, ItemPointer::INVALID);
                    }
                }
            }
            GcVersionType::CommitDelete => {
                let tombstone = header.next_item_pointer(slot);
                if !tombstone.is_null() {
                    // a row updated then deleted by one transaction ends in a
                    // version that carries data and index entries
                    if let (Some(cell), Ok(tombstone_group)) =
                        (&cell, self.locator.get_tile_group(tombstone.block))
                    {
                        if let Some(tuple) = tombstone_group.read_tuple(tombstone.offset) {
                            self.retract_index_entries(table, cell, tombstone, &tuple, true)?;
                        }
                    }
                    slots.push(tombstone);
                }
            }
            _ => {}
        }

        if entry.kind.ends_row() {
            if let Some(cell) = &cell {
                cell.invalidate();
            }
        }

        for location in &slots {
            self.free_slot(table, *location)?;
        }
        Ok(slots.len())
    }

    /// Removes the index entries of a dead version. When only the version
    /// dies, entries whose key is still carried by a live version of the same
    /// row are kept.
    fn retract_index_entries(
        &self,
        table: &DataTable,
        cell: &IndirectionCellRef,
        location: ItemPointer,
        tuple: &Tuple,
        ends_row: bool,
    ) -> Result<(), StoreError> {
        let live = if ends_row {
            Vec::new()
        } else {
            self.live_versions(cell, location)
        };
        for index in table.indexes()? {
            let key = index.key_of(tuple);
            if live.iter().any(|version| index.key_of(version) == key) {
                continue;
            }
            index.delete_entry(&key, cell)?;
        }
        Ok(())
    }

    /// Data of every version reachable from `cell`, except `skip`.
    fn live_versions(&self, cell: &IndirectionCellRef, skip: ItemPointer) -> Vec<Tuple> {
        let mut versions = Vec::new();
        let mut seen = HashSet::new();
        let mut current = cell.location();
        while !current.is_null() && seen.insert(current) {
            let Ok(group) = self.locator.get_tile_group(current.block) else {
                break;
            };
            if !group.header().contains(current.offset) {
                break;
            }
            if current != skip {
                if let Some(tuple) = group.read_tuple(current.offset) {
                    versions.push(tuple);
                }
            }
            current = group.header().prev_item_pointer(current.offset);
        }
        versions
    }

    fn free_slot(&self, table: &DataTable, location: ItemPointer) -> Result<(), StoreError> {
        let Ok(group) = self.locator.get_tile_group(location.block) else {
            return Ok(());
        };
        if !group.header().contains(location.offset) {
            return Ok(());
        }
        group.header().reset_slot(location.offset);
        group.clear_tuple(location.offset);
        table.decrease_tuple_count(1);

        let mut free = self.free_slots.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(queue) = free.get_mut(&table.oid()) {
            queue.push_back(location);
        }
        Ok(())
    }
}

impl GcProvider for VacuumGc {
    fn register_table(&self, table_oid: Oid) {
        if let Ok(mut free) = self.free_slots.lock() {
            free.entry(table_oid).or_default();
        }
    }

    fn deregister_table(&self, table_oid: Oid) {
        if let Ok(mut free) = self.free_slots.lock() {
            free.remove(&table_oid);
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|entry| entry.table_oid != table_oid);
        }
    }

    fn return_free_slot(&self, table_oid: Oid) -> Option<ItemPointer> {
        self.free_slots
            .lock()
            .ok()
            .and_then(|mut free| free.get_mut(&table_oid).and_then(VecDeque::pop_front))
    }

    fn recycle_old_tuple_slot(&self, table_oid: Oid, location: ItemPointer, cid: Cid, kind: GcVersionType) {
        if let Ok(mut pending) = self.pending.lock() {
            trace!(table_oid, %location, cid, ?kind, "queue retired version");
            pending.push(GcEntry {
                table_oid,
                location,
                cid,
                kind,
            });
        }
    }

    fn recycle_invalid_tuple_slot(&self, table_oid: Oid, location: ItemPointer) {
        let Ok(group) = self.locator.get_tile_group(location.block) else {
            return;
        };
        if !group.header().contains(location.offset) {
            return;
        }
        group.header().reset_slot(location.offset);
        group.clear_tuple(location.offset);
        if let Ok(mut free) = self.free_slots.lock() {
            if let Some(queue) = free.get_mut(&table_oid) {
                trace!(table_oid, %location, "recycle invalid slot");
                queue.push_back(location);
            }
        }
    }
}

impl fmt::Debug for VacuumGc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VacuumGc")
            .field("max_attempts", &self.max_attempts)
            .field("pending", &self.pending_count())
            .finish()
    }
}
