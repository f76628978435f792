//! A single tile: per-slot column values published through `ArcSwapOption`.
//!
//! Each slot is written by exactly one owner (the allocator that reserved it
//! or the transaction that owns the version), so a store is a plain publish.
//! Readers get an `Arc` snapshot and never observe a partially written slot.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::types::{ColumnId, Value};

/// Storage for a subset of a table's columns across every slot of a tile group.
#[derive(Debug)]
pub struct Tile {
    /// Table column ids stored in this tile, in tile order
    column_ids: Vec<ColumnId>,
    /// One published row fragment per slot
    slots: Box<[ArcSwapOption<Vec<Value>>]>,
}

impl Tile {
    /// Creates an empty tile.
    ///
    /// # Arguments
    /// * `column_ids` - Table columns held by this tile
    /// * `capacity` - Number of slots
    pub fn new(column_ids: Vec<ColumnId>, capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { column_ids, slots }
    }

    pub fn column_ids(&self) -> &[ColumnId] {
        &self.column_ids
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Publishes the fragment for `slot`. Out-of-range slots are ignored.
    pub fn store(&self, slot: usize, values: Vec<Value>) {
        if let Some(cell) = self.slots.get(slot) {
            cell.store(Some(Arc::new(values)));
        }
    }

    /// Loads the fragment for `slot`, if any data was written.
    pub fn load(&self, slot: usize) -> Option<Arc<Vec<Value>>> {
        self.slots.get(slot).and_then(|cell| cell.load_full())
    }

    /// Returns one value by its position inside this tile.
    pub fn value(&self, slot: usize, tile_column: usize) -> Option<Value> {
        self.load(slot)
            .and_then(|values| values.get(tile_column).cloned())
    }

    /// Drops the fragment for `slot`.
    pub fn clear(&self, slot: usize) {
        if let Some(cell) = self.slots.get(slot) {
            cell.store(None);
        }
    }
}
