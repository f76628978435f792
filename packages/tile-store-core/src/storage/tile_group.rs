//! Fixed-capacity block of tuple storage plus its visibility header.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::item_pointer::Oid;
use super::tile::Tile;
use super::tile_group_header::TileGroupHeader;
use crate::types::{ColumnId, Tuple, Value};

/// How a table's columns are split into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    /// One tile holding every column
    #[default]
    Row,
    /// One tile per column
    Column,
}

impl LayoutType {
    /// Groups `column_count` columns into tiles.
    pub fn partition(&self, column_count: usize) -> Vec<Vec<ColumnId>> {
        match self {
            LayoutType::Row => vec![(0..column_count).collect()],
            LayoutType::Column => (0..column_count).map(|c| vec![c]).collect(),
        }
    }
}

/// A tile group owns `capacity` slots spread over one or more tiles.
pub struct TileGroup {
    id: Oid,
    table_oid: Oid,
    header: TileGroupHeader,
    tiles: Vec<Tile>,
    /// Table column -> (tile index, column inside the tile)
    column_map: Vec<(usize, usize)>,
}

impl TileGroup {
    /// Creates an empty tile group.
    ///
    /// # Arguments
    /// * `id` - Globally unique tile group id
    /// * `table_oid` - Owning table
    /// * `column_count` - Number of columns in the table schema
    /// * `layout` - Column-to-tile partitioning
    /// * `capacity` - Number of tuple slots
    pub fn new(id: Oid, table_oid: Oid, column_count: usize, layout: LayoutType, capacity: u32) -> Self {
        let partition = layout.partition(column_count);
        let mut column_map = vec![(0, 0); column_count];
        for (tile_idx, columns) in partition.iter().enumerate() {
            for (pos, &column) in columns.iter().enumerate() {
                column_map[column] = (tile_idx, pos);
            }
        }
        let tiles = partition
            .into_iter()
            .map(|columns| Tile::new(columns, capacity as usize))
            .collect();

        Self {
            id,
            table_oid,
            header: TileGroupHeader::new(capacity),
            tiles,
            column_map,
        }
    }

    pub fn id(&self) -> Oid {
        self.id
    }

    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    pub fn header(&self) -> &TileGroupHeader {
        &self.header
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_map.len()
    }

    /// Reserves a slot and, if `tuple` is given, writes it there.
    ///
    /// # Returns
    /// The slot offset, or `None` if the group is full. A full group is a
    /// signal to retry on the current active group, never an error.
    pub fn insert_tuple(&self, tuple: Option<&Tuple>) -> Option<Oid> {
        let slot = self.header.next_empty_tuple_slot()?;
        if let Some(tuple) = tuple {
            self.copy_tuple(tuple, slot);
        }
        Some(slot)
    }

    /// Overwrites the content of an already reserved slot.
    ///
    /// The caller must hold exclusive access to the slot.
    pub fn copy_tuple(&self, tuple: &Tuple, slot: Oid) {
        for tile in &self.tiles {
            let values = tile
                .column_ids()
                .iter()
                .map(|&c| tuple.value(c).clone())
                .collect();
            tile.store(slot as usize, values);
        }
    }

    /// Reads one column of a slot.
    pub fn value(&self, slot: Oid, column: ColumnId) -> Option<Value> {
        let &(tile_idx, pos) = self.column_map.get(column)?;
        self.tiles.get(tile_idx)?.value(slot as usize, pos)
    }

    /// Reassembles the tuple stored in `slot`.
    ///
    /// # Returns
    /// `None` if the slot holds no data (an empty version or a reset slot).
    pub fn read_tuple(&self, slot: Oid) -> Option<Tuple> {
        let mut values = vec![Value::Null; self.column_map.len()];
        for tile in &self.tiles {
            let fragment = tile.load(slot as usize)?;
            for (pos, &column) in tile.column_ids().iter().enumerate() {
                if let (Some(dst), Some(src)) = (values.get_mut(column), fragment.get(pos)) {
                    *dst = src.clone();
                }
            }
        }
        Some(Tuple::new(values))
    }

    /// Drops the data of a slot.
    pub fn clear_tuple(&self, slot: Oid) {
        for tile in &self.tiles {
            tile.clear(slot as usize);
        }
    }

    pub fn next_tuple_slot(&self) -> Oid {
        self.header.next_tuple_slot()
    }

    /// Total slots of this group.
    pub fn allocated_tuple_count(&self) -> Oid {
        self.header.capacity()
    }

    pub fn active_tuple_count(&self) -> usize {
        self.header.active_tuple_count()
    }
}

impl fmt::Debug for TileGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileGroup")
            .field("id", &self.id)
            .field("table_oid", &self.table_oid)
            .field("tiles", &self.tiles.len())
            .field("header", &self.header)
            .finish()
    }
}

impl fmt::Display for TileGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TileGroup[{}] table {} tiles {} slots {}/{} active {}",
            self.id,
            self.table_oid,
            self.tiles.len(),
            self.next_tuple_slot(),
            self.allocated_tuple_count(),
            self.active_tuple_count()
        )
    }
}
