//! Logical table over an append-only set of tile groups.
//!
//! Each table has:
//! - A fixed schema with column constraints
//! - A small array of active tile groups and indirection arrays that
//!   writers fill concurrently, replaced by whichever writer takes the last slot
//! - Indexes whose entries point at indirection cells
//! - Outgoing foreign keys (this table is the source) and incoming ones
//!   (this table is the sink)

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use arc_swap::ArcSwap;
use tracing::{debug, trace, warn};

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::error::{ConstraintErrorKind, StoreError};
use crate::gc::GcProvider;
use crate::index::{Index, IndexConstraintType};
use crate::storage::{
    IndirectionArray, IndirectionCellRef, ItemPointer, LayoutType, Oid, TileGroup,
    TileGroupLocator, INVALID_CID, INVALID_TXN_ID, MAX_CID,
};
use crate::transaction::{Transaction, TransactionManager, VisibilityType};
use crate::types::{ColumnId, Schema, Tuple, Value};

use super::foreign_key::ForeignKey;
use super::validation;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub struct DataTable {
    oid: Oid,
    name: String,
    schema: Schema,
    layout: LayoutType,
    tuples_per_tile_group: u32,
    indirection_array_size: u32,
    locator: Arc<TileGroupLocator>,
    gc: Arc<dyn GcProvider>,
    /// Tile group ids in creation order
    tile_groups: RwLock<Vec<Oid>>,
    active_tile_groups: Box<[ArcSwap<TileGroup>]>,
    /// Set while the active group at the same index is sealed and its
    /// replacement failed to install
    replacement_pending: Box<[AtomicBool]>,
    active_indirection_arrays: Box<[ArcSwap<IndirectionArray>]>,
    tile_group_count: AtomicUsize,
    tuple_count: AtomicUsize,
    dirty: AtomicBool,
    indexes: RwLock<Vec<Arc<Index>>>,
    /// Constraints where this table is the source
    foreign_keys: Mutex<Vec<ForeignKey>>,
    /// Constraints where this table is the sink
    foreign_key_sources: Mutex<Vec<ForeignKey>>,
}

impl DataTable {
    /// Creates a table with its initial active tile groups and indirection
    /// arrays and registers it with the garbage collector.
    ///
    /// # Arguments
    /// * `oid` - Table oid
    /// * `name` - Table name
    /// * `schema` - Column definitions and CHECK constraints
    /// * `config` - Storage sizing
    /// * `locator` - Tile group registry shared with the transaction manager
    /// * `gc` - Slot recycling provider
    pub fn new(
        oid: Oid,
        name: impl Into<String>,
        schema: Schema,
        config: &StoreConfig,
        locator: Arc<TileGroupLocator>,
        gc: Arc<dyn GcProvider>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        if schema.column_count() == 0 {
            return Err(StoreError::InvalidSchema("table has no columns".to_string()));
        }

        let name = name.into();
        let mut tile_group_ids = Vec::with_capacity(config.active_tile_group_count);
        let mut active_tile_groups = Vec::with_capacity(config.active_tile_group_count);
        for _ in 0..config.active_tile_group_count {
            let group = Arc::new(TileGroup::new(
                locator.next_oid(),
                oid,
                schema.column_count(),
                config.layout,
                config.tuples_per_tile_group,
            ));
            locator.add_tile_group(group.clone())?;
            tile_group_ids.push(group.id());
            active_tile_groups.push(ArcSwap::new(group));
        }

        let active_indirection_arrays = (0..config.active_indirection_array_count)
            .map(|_| {
                ArcSwap::from_pointee(IndirectionArray::new(
                    locator.next_oid(),
                    config.indirection_array_size,
                ))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        gc.register_table(oid);
        debug!(table = %name, oid, "created table");

        Ok(Self {
            oid,
            name,
            schema,
            layout: config.layout,
            tuples_per_tile_group: config.tuples_per_tile_group,
            indirection_array_size: config.indirection_array_size,
            locator,
            gc,
            tile_group_count: AtomicUsize::new(tile_group_ids.len()),
            tile_groups: RwLock::new(tile_group_ids),
            replacement_pending: active_tile_groups.iter().map(|_| AtomicBool::new(false)).collect(),
            active_tile_groups: active_tile_groups.into_boxed_slice(),
            active_indirection_arrays,
            tuple_count: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
            indexes: RwLock::new(Vec::new()),
            foreign_keys: Mutex::new(Vec::new()),
            foreign_key_sources: Mutex::new(Vec::new()),
        })
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn layout(&self) -> LayoutType {
        self.layout
    }

    // ------------------------------------------------------------------
    // Slot acquisition
    // ------------------------------------------------------------------

    /// Returns a slot for a new tuple version.
    ///
    /// A slot recycled by the garbage collector is preferred; otherwise the
    /// slot comes from the active tile group picked by the tuple count. The
    /// writer that receives the last slot of a group installs its
    /// replacement, so growth happens exactly once per exhausted group and
    /// writers that find the group full simply retry on the current one. If
    /// that install fails the slot is still handed out, and the next writer
    /// to find the group full retries the install and reports its error
    /// instead of waiting.
    ///
    /// # Arguments
    /// * `tuple` - Data to write into the slot, or `None` for an empty version
    pub fn get_empty_tuple_slot(&self, tuple: Option<&Tuple>) -> Result<ItemPointer, StoreError> {
        if let Some(location) = self.recycled_slot(tuple) {
            return Ok(location);
        }

        let active_idx = self.tuple_count.load(Ordering::Relaxed) % self.active_tile_groups.len();
        let (group, slot) = loop {
            let group = self.active_tile_groups[active_idx].load_full();
            if let Some(slot) = group.insert_tuple(tuple) {
                break (group, slot);
            }
            let failed_install = self.replacement_pending[active_idx]
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok();
            if failed_install {
                self.replace_sealed_tile_group(active_idx)?;
            } else {
                // sealed group, its replacement is being installed
                thread::yield_now();
            }
        };

        // a failed replacement is retried by the next writer that finds the group sealed
        if slot + 1 == group.allocated_tuple_count() && self.replace_sealed_tile_group(active_idx).is_err() {
            trace!(table = %self.name, tile_group_id = group.id(), "left sealed tile group unreplaced");
        }

        trace!(table = %self.name, tile_group_id = group.id(), slot, "acquired tuple slot");
        Ok(ItemPointer::new(group.id(), slot))
    }

    /// Takes a slot from the garbage collector if it passes the reuse checks:
    /// the tile group belongs to this table and the slot header is reset.
    fn recycled_slot(&self, tuple: Option<&Tuple>) -> Option<ItemPointer> {
        let location = self.gc.return_free_slot(self.oid)?;
        match self.locator.get_tile_group(location.block) {
            Ok(group)
                if group.table_oid() == self.oid
                    && group.header().contains(location.offset)
                    && group.header().transaction_id(location.offset) == INVALID_TXN_ID =>
            {
                if let Some(tuple) = tuple {
                    group.copy_tuple(tuple, location.offset);
                }
                trace!(table = %self.name, %location, "reusing recycled slot");
                Some(location)
            }
            _ => {
                warn!(table = %self.name, %location, "discarding recycled slot that fails reuse checks");
                None
            }
        }
    }

    fn create_tile_group(&self) -> Result<Arc<TileGroup>, StoreError> {
        let group = Arc::new(TileGroup::new(
            self.locator.next_oid(),
            self.oid,
            self.schema.column_count(),
            self.layout,
            self.tuples_per_tile_group,
        ));
        self.locator.add_tile_group(group.clone())?;
        self.tile_groups
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .push(group.id());
        Ok(group)
    }

    fn replace_sealed_tile_group(&self, active_idx: usize) -> Result<(), StoreError> {
        let result = self.add_default_tile_group(active_idx);
        if let Err(e) = &result {
            warn!(table = %self.name, active_idx, error = %e, "failed to replace sealed tile group");
            self.replacement_pending[active_idx].store(true, Ordering::Release);
        }
        result
    }

    /// Creates, registers and publishes a replacement for an active group.
    fn add_default_tile_group(&self, active_idx: usize) -> Result<(), StoreError> {
        let group = self.create_tile_group()?;
        let id = group.id();
        self.active_tile_groups[active_idx].store(group);
        let count = self.tile_group_count.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(table = %self.name, tile_group_id = id, count, "added tile group");
        Ok(())
    }

    /// Allocates an indirection cell and points it at `location`.
    ///
    /// The allocator that takes the second-to-last (or last) cell of an
    /// array swaps in a replacement; the compare-and-swap against the array
    /// it allocated from makes the replacement happen once.
    fn allocate_indirection(&self, location: ItemPointer) -> IndirectionCellRef {
        let idx = self.tuple_count.load(Ordering::Relaxed) % self.active_indirection_arrays.len();
        loop {
            let array = self.active_indirection_arrays[idx].load_full();
            let Some(offset) = array.allocate_indirection() else {
                thread::yield_now();
                continue;
            };

            if offset + 2 >= array.capacity() {
                let still_active = Arc::ptr_eq(&self.active_indirection_arrays[idx].load(), &array);
                if still_active {
                    let replacement = Arc::new(IndirectionArray::new(
                        self.locator.next_oid(),
                        self.indirection_array_size,
                    ));
                    let replacement_id = replacement.id();
                    let previous = self.active_indirection_arrays[idx].compare_and_swap(&array, replacement);
                    if Arc::ptr_eq(&previous, &array) {
                        debug!(table = %self.name, array_id = replacement_id, "added indirection array");
                    }
                }
            }

            if let Some(cell) = IndirectionCellRef::new(array, offset) {
                cell.set_location(location);
                return cell;
            }
        }
    }

    /// Returns a slot that never became reachable to the garbage collector.
    fn release_slot(&self, location: ItemPointer) {
        if let Ok(group) = self.locator.get_tile_group(location.block) {
            if group.header().contains(location.offset) {
                group.header().reset_slot(location.offset);
                group.clear_tuple(location.offset);
            }
        }
        self.gc.recycle_invalid_tuple_slot(self.oid, location);
    }

    // ------------------------------------------------------------------
    // Insert and version creation
    // ------------------------------------------------------------------

    /// Inserts a new row for `txn`.
    ///
    /// Acquires a slot, validates column constraints, allocates the row's
    /// indirection cell, inserts into every index and checks outgoing
    /// foreign keys. On failure every index entry written is removed, the
    /// cell is pointed nowhere and the slot goes back to the collector; the
    /// tuple count only changes on success. The caller records the insert
    /// with `TransactionManager::perform_insert`.
    ///
    /// # Returns
    /// Location of the new version.
    pub fn insert_tuple(
        &self,
        tuple: &Tuple,
        txn: &Transaction,
        txn_manager: &TransactionManager,
        catalog: &Catalog,
    ) -> Result<ItemPointer, StoreError> {
        let location = self.get_empty_tuple_slot(Some(tuple))?;
        let group = match self.locator.get_tile_group(location.block) {
            Ok(group) => group,
            Err(e) => {
                self.release_slot(location);
                return Err(e);
            }
        };
        let header = group.header();
        // claim the slot so concurrent unique checks see an in-flight insert
        header.set_begin_commit_id(location.offset, MAX_CID);
        header.set_end_commit_id(location.offset, MAX_CID);
        header.set_transaction_id(location.offset, txn.txn_id());

        if let Err(e) = validation::check_constraints(&self.name, &self.schema, tuple) {
            debug!(table = %self.name, error = %e, "insert rejected");
            self.release_slot(location);
            return Err(e);
        }

        let cell = self.allocate_indirection(location);
        header.set_indirection(location.offset, Some(cell.clone()));

        let inserted = match self.insert_in_indexes(tuple, &cell, txn, txn_manager) {
            Ok(inserted) => inserted,
            Err(e) => {
                debug!(table = %self.name, error = %e, "insert rejected by index");
                cell.invalidate();
                self.release_slot(location);
                return Err(e);
            }
        };

        if let Err(e) = self.check_foreign_key_constraints(tuple, None, txn, txn_manager, catalog) {
            debug!(table = %self.name, error = %e, "insert rejected by foreign key");
            self.retract_entries(&inserted, &cell);
            cell.invalidate();
            self.release_slot(location);
            return Err(e);
        }

        self.increase_tuple_count(1);
        self.dirty.store(true, Ordering::Release);
        Ok(location)
    }

    /// Allocates an empty slot for a delete tombstone.
    pub fn insert_empty_version(&self) -> Result<ItemPointer, StoreError> {
        let location = self.get_empty_tuple_slot(None)?;
        self.increase_tuple_count(1);
        Ok(location)
    }

    /// Allocates an empty slot for the new version of a non-key update; the
    /// caller projects the new values into it.
    pub fn acquire_version(&self) -> Result<ItemPointer, StoreError> {
        let location = self.get_empty_tuple_slot(None)?;
        self.increase_tuple_count(1);
        Ok(location)
    }

    /// Gives back a version slot from `acquire_version` or
    /// `insert_empty_version` that was never linked into a chain.
    pub fn release_version(&self, location: ItemPointer) {
        self.decrease_tuple_count(1);
        self.release_slot(location);
    }

    /// Validates a new version and adds the secondary index entries its
    /// update needs.
    ///
    /// Only secondary indexes whose key columns intersect `targets` get a new
    /// entry; the primary key cannot change on this path. Outgoing foreign
    /// keys over updated columns are re-checked.
    ///
    /// # Arguments
    /// * `tuple` - The new version's values
    /// * `targets` - Columns written by the update
    /// * `cell` - Indirection cell of the row
    pub fn install_version(
        &self,
        tuple: &Tuple,
        targets: &[ColumnId],
        cell: &IndirectionCellRef,
        txn: &Transaction,
        txn_manager: &TransactionManager,
        catalog: &Catalog,
    ) -> Result<(), StoreError> {
        validation::check_constraints(&self.name, &self.schema, tuple)?;
        let inserted = self.insert_in_secondary_indexes(tuple, targets, cell, txn, txn_manager)?;
        if let Err(e) = self.check_foreign_key_constraints(tuple, Some(targets), txn, txn_manager, catalog) {
            self.retract_entries(&inserted, cell);
            return Err(e);
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Removes secondary entries of an own uncommitted version that is about
    /// to be overwritten in place, unless an older version still carries the
    /// key.
    ///
    /// # Arguments
    /// * `old` - Values being overwritten
    /// * `new` - Values replacing them
    /// * `location` - The version being overwritten
    /// * `cell` - Indirection cell of the row
    pub fn retract_replaced_keys(
        &self,
        old: &Tuple,
        new: &Tuple,
        location: ItemPointer,
        cell: &IndirectionCellRef,
    ) -> Result<(), StoreError> {
        let older = self.older_versions(location);
        for index in self.indexes()? {
            if index.constraint() == IndexConstraintType::PrimaryKey {
                continue;
            }
            let old_key = index.key_of(old);
            if old_key == index.key_of(new) || older.iter().any(|t| index.key_of(t) == old_key) {
                continue;
            }
            index.delete_entry(&old_key, cell)?;
        }
        Ok(())
    }

    fn older_versions(&self, location: ItemPointer) -> Vec<Tuple> {
        let mut versions = Vec::new();
        let mut current = match self.locator.get_tile_group(location.block) {
            Ok(group) if group.header().contains(location.offset) => {
                group.header().prev_item_pointer(location.offset)
            }
            _ => return versions,
        };
        while !current.is_null() {
            let Ok(group) = self.locator.get_tile_group(current.block) else {
                break;
            };
            if !group.header().contains(current.offset) {
                break;
            }
            if let Some(tuple) = group.read_tuple(current.offset) {
                versions.push(tuple);
            }
            current = group.header().prev_item_pointer(current.offset);
        }
        versions
    }

    // ------------------------------------------------------------------
    // Index maintenance
    // ------------------------------------------------------------------

    /// Inserts the row into every index, newest index first. Primary and
    /// unique keys use a conditional insert that fails on a visible or
    /// in-flight duplicate.
    ///
    /// # Returns
    /// The entries written, so a later failure can retract them.
    fn insert_in_indexes(
        &self,
        tuple: &Tuple,
        cell: &IndirectionCellRef,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Result<Vec<(Arc<Index>, Vec<Value>)>, StoreError> {
        let mut inserted = Vec::new();
        for index in self.indexes()?.into_iter().rev() {
            let key = index.key_of(tuple);
            match self.insert_entry(&index, key.clone(), cell, txn, txn_manager) {
                Ok(true) => inserted.push((index, key)),
                Ok(false) => {
                    self.retract_entries(&inserted, cell);
                    return Err(StoreError::IndexConflict {
                        index: index.name().to_string(),
                    });
                }
                Err(e) => {
                    self.retract_entries(&inserted, cell);
                    return Err(e);
                }
            }
        }
        Ok(inserted)
    }

    /// Adds entries for an updated version to the secondary indexes whose
    /// key columns intersect `targets`.
    fn insert_in_secondary_indexes(
        &self,
        tuple: &Tuple,
        targets: &[ColumnId],
        cell: &IndirectionCellRef,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Result<Vec<(Arc<Index>, Vec<Value>)>, StoreError> {
        let mut inserted = Vec::new();
        for index in self.indexes()?.into_iter().rev() {
            if index.constraint() == IndexConstraintType::PrimaryKey || !index.covers_any(targets) {
                continue;
            }
            let key = index.key_of(tuple);
            if index.scan_key(&key)?.contains(cell) {
                continue;
            }
            match self.insert_entry(&index, key.clone(), cell, txn, txn_manager) {
                Ok(true) => inserted.push((index, key)),
                Ok(false) => {
                    self.retract_entries(&inserted, cell);
                    return Err(StoreError::IndexConflict {
                        index: index.name().to_string(),
                    });
                }
                Err(e) => {
                    self.retract_entries(&inserted, cell);
                    return Err(e);
                }
            }
        }
        Ok(inserted)
    }

    fn insert_entry(
        &self,
        index: &Index,
        key: Vec<Value>,
        cell: &IndirectionCellRef,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Result<bool, StoreError> {
        // NULL never equals NULL, so a key containing one cannot conflict
        if !index.constraint().is_unique() || key.iter().any(Value::is_null) {
            return index.insert_entry(key, cell.clone()).map(|_| true);
        }
        let candidate = key.clone();
        index.cond_insert_entry(key, cell.clone(), |location| {
            self.is_key_occupied(index, &candidate, location, txn, txn_manager)
        })
    }

    /// Returns `true` if the row behind an existing entry still holds `key`
    /// in a version that blocks a duplicate. Walks below uncommitted
    /// versions and other transactions' pending deletes, because an abort
    /// would bring the older key back. The inserter's own delete frees the key.
    fn is_key_occupied(
        &self,
        index: &Index,
        key: &[Value],
        location: ItemPointer,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> bool {
        let mut current = location;
        while !current.is_null() {
            let Ok(group) = self.locator.get_tile_group(current.block) else {
                return false;
            };
            let header = group.header();
            let slot = current.offset;
            if !header.contains(slot) {
                return false;
            }
            let owner = header.transaction_id(slot);
            if owner != INVALID_TXN_ID
                && owner != txn.txn_id()
                && header.begin_commit_id(slot) == MAX_CID
                && header.end_commit_id(slot) == INVALID_CID
            {
                // another transaction's pending delete; the row below still holds the key
                current = header.prev_item_pointer(slot);
                continue;
            }
            if !txn_manager.is_occupied(txn, current) {
                return false;
            }
            if group
                .read_tuple(slot)
                .is_some_and(|tuple| index.key_of(&tuple) == key)
            {
                return true;
            }
            if header.begin_commit_id(slot) != MAX_CID {
                return false;
            }
            current = header.prev_item_pointer(slot);
        }
        false
    }

    fn retract_entries(&self, inserted: &[(Arc<Index>, Vec<Value>)], cell: &IndirectionCellRef) {
        for (index, key) in inserted {
            if let Err(e) = index.delete_entry(key, cell) {
                warn!(table = %self.name, index = index.name(), error = %e, "failed to retract index entry");
            }
        }
    }

    // ------------------------------------------------------------------
    // Foreign keys and visible reads
    // ------------------------------------------------------------------

    /// Checks that every outgoing foreign key of `tuple` finds a sink row
    /// visible to `txn`. NULL keys are not checked.
    ///
    /// # Arguments
    /// * `only_columns` - Restrict the check to keys over these columns
    fn check_foreign_key_constraints(
        &self,
        tuple: &Tuple,
        only_columns: Option<&[ColumnId]>,
        txn: &Transaction,
        txn_manager: &TransactionManager,
        catalog: &Catalog,
    ) -> Result<(), StoreError> {
        for fk in self.foreign_keys()? {
            if only_columns.is_some_and(|columns| !fk.touches_source(columns)) {
                continue;
            }
            let key = fk.source_key(tuple);
            if key.iter().any(Value::is_null) {
                continue;
            }
            let sink = catalog.get_table(fk.sink_table_oid)?;
            if sink.find_visible(&fk.sink_columns, &key, txn, txn_manager)?.is_empty() {
                return Err(StoreError::ConstraintViolation {
                    table: self.name.clone(),
                    kind: ConstraintErrorKind::ForeignKey {
                        constraint: fk.name.clone(),
                        sink_table: sink.name().to_string(),
                    },
                });
            }
        }
        Ok(())
    }

    /// Rows visible to `txn` whose `columns` equal `key`.
    ///
    /// Uses an index with exactly these key columns when one exists,
    /// otherwise a sequential scan.
    pub fn find_visible(
        &self,
        columns: &[ColumnId],
        key: &[Value],
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Result<Vec<(ItemPointer, Tuple)>, StoreError> {
        if let Some(index) = self.index_on(columns)? {
            let mut rows = Vec::new();
            for cell in index.scan_key(key)? {
                if let Some((location, tuple)) = self.visible_version(cell.location(), txn, txn_manager) {
                    if tuple.key(columns) == key {
                        rows.push((location, tuple));
                    }
                }
            }
            return Ok(rows);
        }
        Ok(self
            .scan_visible(txn, txn_manager)?
            .into_iter()
            .filter(|(_, tuple)| tuple.key(columns) == key)
            .collect())
    }

    /// Walks a version chain from `start` towards older versions and returns
    /// the one `txn` sees.
    pub fn visible_version(
        &self,
        start: ItemPointer,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Option<(ItemPointer, Tuple)> {
        let mut current = start;
        while !current.is_null() {
            let group = self.locator.get_tile_group(current.block).ok()?;
            if !group.header().contains(current.offset) {
                return None;
            }
            match txn_manager.is_visible(txn, &group, current.offset) {
                VisibilityType::Ok => {
                    return group.read_tuple(current.offset).map(|tuple| (current, tuple));
                }
                VisibilityType::Deleted => return None,
                VisibilityType::Invisible => {
                    current = group.header().prev_item_pointer(current.offset);
                }
            }
        }
        None
    }

    /// Every row version visible to `txn`, in tile group order.
    pub fn scan_visible(
        &self,
        txn: &Transaction,
        txn_manager: &TransactionManager,
    ) -> Result<Vec<(ItemPointer, Tuple)>, StoreError> {
        let ids = self
            .tile_groups
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone();

        let scan_group = |id: &Oid| -> Vec<(ItemPointer, Tuple)> {
            let Ok(group) = self.locator.get_tile_group(*id) else {
                return Vec::new();
            };
            (0..group.next_tuple_slot())
                .filter(|&slot| txn_manager.is_visible(txn, &group, slot) == VisibilityType::Ok)
                .filter_map(|slot| {
                    group
                        .read_tuple(slot)
                        .map(|tuple| (ItemPointer::new(*id, slot), tuple))
                })
                .collect()
        };

        #[cfg(feature = "parallel")]
        let per_group: Vec<Vec<(ItemPointer, Tuple)>> = ids.par_iter().map(scan_group).collect();
        #[cfg(not(feature = "parallel"))]
        let per_group: Vec<Vec<(ItemPointer, Tuple)>> = ids.iter().map(scan_group).collect();

        Ok(per_group.into_iter().flatten().collect())
    }

    // ------------------------------------------------------------------
    // Tile group access
    // ------------------------------------------------------------------

    /// Tile group at position `offset` in creation order.
    pub fn get_tile_group(&self, offset: usize) -> Option<Arc<TileGroup>> {
        let id = *self.tile_groups.read().ok()?.get(offset)?;
        self.locator.get_tile_group(id).ok()
    }

    /// Tile group by id, if it belongs to this table.
    pub fn get_tile_group_by_id(&self, id: Oid) -> Result<Arc<TileGroup>, StoreError> {
        let group = self.locator.get_tile_group(id)?;
        if group.table_oid() != self.oid {
            return Err(StoreError::TileGroupNotFound(id));
        }
        Ok(group)
    }

    /// Tile group ids in creation order.
    pub fn tile_group_ids(&self) -> Result<Vec<Oid>, StoreError> {
        Ok(self
            .tile_groups
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    pub fn tile_group_count(&self) -> usize {
        self.tile_group_count.load(Ordering::Acquire)
    }

    /// Drops every tile group and starts over with fresh active groups.
    /// Index entries are cleared with them.
    pub fn drop_tile_groups(&self) -> Result<(), StoreError> {
        let ids = std::mem::take(
            &mut *self
                .tile_groups
                .write()
                .map_err(|_| StoreError::LockPoisoned)?,
        );
        for id in &ids {
            self.locator.drop_tile_group(*id)?;
        }
        for index in self.indexes()? {
            index.clear()?;
        }
        for (active, pending) in self.active_tile_groups.iter().zip(self.replacement_pending.iter()) {
            active.store(self.create_tile_group()?);
            pending.store(false, Ordering::Release);
        }
        for active in self.active_indirection_arrays.iter() {
            active.store(Arc::new(IndirectionArray::new(
                self.locator.next_oid(),
                self.indirection_array_size,
            )));
        }
        self.tile_group_count
            .store(self.active_tile_groups.len(), Ordering::Release);
        self.tuple_count.store(0, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
        debug!(table = %self.name, dropped = ids.len(), "dropped tile groups");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    /// Attaches an index. At most one primary key is allowed and index names
    /// are unique per table.
    pub fn add_index(&self, index: Index) -> Result<Arc<Index>, StoreError> {
        let mut indexes = self.indexes.write().map_err(|_| StoreError::LockPoisoned)?;
        if indexes.iter().any(|i| i.name() == index.name()) {
            return Err(StoreError::InvalidSchema(format!(
                "index '{}' already exists on '{}'",
                index.name(),
                self.name
            )));
        }
        if index.constraint() == IndexConstraintType::PrimaryKey
            && indexes
                .iter()
                .any(|i| i.constraint() == IndexConstraintType::PrimaryKey)
        {
            return Err(StoreError::InvalidSchema(format!(
                "table '{}' already has a primary key",
                self.name
            )));
        }
        let index = Arc::new(index);
        indexes.push(index.clone());
        self.dirty.store(true, Ordering::Release);
        debug!(table = %self.name, index = index.name(), "added index");
        Ok(index)
    }

    pub fn indexes(&self) -> Result<Vec<Arc<Index>>, StoreError> {
        Ok(self
            .indexes
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    pub fn index_count(&self) -> usize {
        self.indexes.read().map(|i| i.len()).unwrap_or(0)
    }

    /// Index at position `offset` in registration order.
    pub fn get_index(&self, offset: usize) -> Option<Arc<Index>> {
        self.indexes.read().ok()?.get(offset).cloned()
    }

    pub fn get_index_with_oid(&self, oid: Oid) -> Result<Arc<Index>, StoreError> {
        self.indexes()?
            .into_iter()
            .find(|i| i.oid() == oid)
            .ok_or_else(|| StoreError::IndexNotFound {
                table: self.name.clone(),
                index: oid.to_string(),
            })
    }

    pub fn drop_index_with_oid(&self, oid: Oid) -> Result<(), StoreError> {
        let mut indexes = self.indexes.write().map_err(|_| StoreError::LockPoisoned)?;
        let position = indexes
            .iter()
            .position(|i| i.oid() == oid)
            .ok_or_else(|| StoreError::IndexNotFound {
                table: self.name.clone(),
                index: oid.to_string(),
            })?;
        indexes.remove(position);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Key columns of the index at `offset`.
    pub fn index_attrs(&self, offset: usize) -> Option<BTreeSet<ColumnId>> {
        self.get_index(offset)
            .map(|index| index.key_attrs().iter().copied().collect())
    }

    pub fn primary_key_index(&self) -> Result<Option<Arc<Index>>, StoreError> {
        Ok(self
            .indexes()?
            .into_iter()
            .find(|i| i.constraint() == IndexConstraintType::PrimaryKey))
    }

    pub fn has_primary_key(&self) -> bool {
        matches!(self.primary_key_index(), Ok(Some(_)))
    }

    pub fn unique_constraint_count(&self) -> usize {
        self.indexes()
            .map(|all| {
                all.iter()
                    .filter(|i| i.constraint() == IndexConstraintType::Unique)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Index whose key columns are exactly `columns`, primary key first.
    pub fn index_on(&self, columns: &[ColumnId]) -> Result<Option<Arc<Index>>, StoreError> {
        let mut candidates: Vec<_> = self
            .indexes()?
            .into_iter()
            .filter(|i| i.key_attrs() == columns)
            .collect();
        candidates.sort_by_key(|i| i.constraint() != IndexConstraintType::PrimaryKey);
        Ok(candidates.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Foreign keys
    // ------------------------------------------------------------------

    /// Adds an outgoing foreign key.
    pub fn add_foreign_key(&self, fk: ForeignKey) -> Result<(), StoreError> {
        let mut fks = self.foreign_keys.lock().map_err(|_| StoreError::LockPoisoned)?;
        if fks.iter().any(|existing| existing.name == fk.name) {
            return Err(StoreError::InvalidSchema(format!(
                "foreign key '{}' already exists on '{}'",
                fk.name, self.name
            )));
        }
        fks.push(fk);
        Ok(())
    }

    /// Outgoing foreign key at position `offset`.
    pub fn get_foreign_key(&self, offset: usize) -> Option<ForeignKey> {
        self.foreign_keys.lock().ok()?.get(offset).cloned()
    }

    /// Removes the outgoing foreign key at position `offset`.
    pub fn drop_foreign_key(&self, offset: usize) -> Result<ForeignKey, StoreError> {
        let mut fks = self.foreign_keys.lock().map_err(|_| StoreError::LockPoisoned)?;
        if offset >= fks.len() {
            return Err(StoreError::InvalidSchema(format!(
                "table '{}' has no foreign key at {}",
                self.name, offset
            )));
        }
        Ok(fks.remove(offset))
    }

    pub fn foreign_key_count(&self) -> usize {
        self.foreign_keys.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn foreign_keys(&self) -> Result<Vec<ForeignKey>, StoreError> {
        Ok(self
            .foreign_keys
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    /// Records an incoming foreign key that references this table.
    pub fn register_foreign_key_source(&self, fk: ForeignKey) -> Result<(), StoreError> {
        let mut sources = self
            .foreign_key_sources
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        sources.push(fk);
        Ok(())
    }

    /// Forgets an incoming foreign key by name.
    pub fn drop_foreign_key_source(&self, name: &str) -> Result<bool, StoreError> {
        let mut sources = self
            .foreign_key_sources
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let before = sources.len();
        sources.retain(|fk| fk.name != name);
        Ok(sources.len() != before)
    }

    pub fn foreign_key_sources(&self) -> Result<Vec<ForeignKey>, StoreError> {
        Ok(self
            .foreign_key_sources
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub fn tuple_count(&self) -> usize {
        self.tuple_count.load(Ordering::Acquire)
    }

    pub fn increase_tuple_count(&self, amount: usize) {
        self.tuple_count.fetch_add(amount, Ordering::AcqRel);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn decrease_tuple_count(&self, amount: usize) {
        let _ = self
            .tuple_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(amount))
            });
        self.dirty.store(true, Ordering::Release);
    }

    pub fn set_tuple_count(&self, count: usize) {
        self.tuple_count.store(count, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
    }

    /// Whether the table changed since the last `reset_dirty`.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn reset_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

impl fmt::Debug for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataTable")
            .field("oid", &self.oid)
            .field("name", &self.name)
            .field("tile_groups", &self.tile_group_count())
            .field("tuples", &self.tuple_count())
            .finish()
    }
}

impl fmt::Display for DataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Table '{}' (oid {}): {} tile groups, {} tuples, {} indexes, {} foreign keys",
            self.name,
            self.oid,
            self.tile_group_count(),
            self.tuple_count(),
            self.index_count(),
            self.foreign_key_count()
        )?;
        if let Ok(ids) = self.tile_group_ids() {
            for id in ids {
                if let Ok(group) = self.locator.get_tile_group(id) {
                    writeln!(f, "  {}", group)?;
                }
            }
        }
        Ok(())
    }
}
