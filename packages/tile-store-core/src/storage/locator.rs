//! Registry resolving tile group ids to live tile groups.
//!
//! Passed by `Arc` to every component that has to turn an `ItemPointer` into
//! storage: tables, the transaction manager and the garbage collector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use super::item_pointer::Oid;
use super::tile_group::TileGroup;
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct TileGroupLocator {
    tile_groups: RwLock<HashMap<Oid, Arc<TileGroup>>>,
    /// Shared id source for tile groups and indirection arrays
    next_oid: AtomicU32,
}

impl TileGroupLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the next storage oid.
    pub fn next_oid(&self) -> Oid {
        self.next_oid.fetch_add(1, Ordering::AcqRel)
    }

    /// Makes a tile group resolvable by its id.
    pub fn add_tile_group(&self, tile_group: Arc<TileGroup>) -> Result<(), StoreError> {
        let mut groups = self
            .tile_groups
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        groups.insert(tile_group.id(), tile_group);
        Ok(())
    }

    /// Resolves a tile group id.
    ///
    /// # Returns
    /// `StoreError::TileGroupNotFound` if the id is unknown or was dropped.
    pub fn get_tile_group(&self, id: Oid) -> Result<Arc<TileGroup>, StoreError> {
        let groups = self
            .tile_groups
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        groups
            .get(&id)
            .cloned()
            .ok_or(StoreError::TileGroupNotFound(id))
    }

    /// Removes a tile group; readers holding an `Arc` keep it alive.
    pub fn drop_tile_group(&self, id: Oid) -> Result<Option<Arc<TileGroup>>, StoreError> {
        let mut groups = self
            .tile_groups
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(groups.remove(&id))
    }

    pub fn tile_group_count(&self) -> Result<usize, StoreError> {
        let groups = self
            .tile_groups
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(groups.len())
    }
}
