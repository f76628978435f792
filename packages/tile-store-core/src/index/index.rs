use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::{IndirectionCellRef, ItemPointer, Oid};
use crate::types::{ColumnId, Schema, Tuple, Value};

/// Kind of an index, which decides how inserts are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexConstraintType {
    /// Non-unique secondary index
    Default,
    /// The table's primary key; at most one per table
    PrimaryKey,
    /// Unique secondary index
    Unique,
}

impl IndexConstraintType {
    /// Primary and unique indexes reject visible or in-flight duplicates.
    pub fn is_unique(&self) -> bool {
        matches!(self, IndexConstraintType::PrimaryKey | IndexConstraintType::Unique)
    }
}

/// Key definition of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Indexed table columns, in key order
    pub key_attrs: Vec<ColumnId>,
    /// Schema of the key, derived from the table schema
    pub key_schema: Schema,
    pub constraint: IndexConstraintType,
}

/// Index over one table.
///
/// Entries are `key -> [cell]`. All operations take the index's own lock, so
/// a conditional insert is atomic against concurrent inserters of the same key.
pub struct Index {
    oid: Oid,
    name: String,
    metadata: IndexMetadata,
    entries: RwLock<BTreeMap<Vec<Value>, Vec<IndirectionCellRef>>>,
    /// Number of entries ever written
    writes: AtomicU64,
}

impl Index {
    /// Creates an empty index.
    ///
    /// # Arguments
    /// * `oid` - Index oid
    /// * `name` - Index name
    /// * `table_schema` - Schema of the indexed table
    /// * `key_attrs` - Indexed column ids, in key order
    /// * `constraint` - Index kind
    ///
    /// # Returns
    /// `StoreError::InvalidSchema` if the key is empty or names an unknown column.
    pub fn new(
        oid: Oid,
        name: impl Into<String>,
        table_schema: &Schema,
        key_attrs: Vec<ColumnId>,
        constraint: IndexConstraintType,
    ) -> Result<Self, StoreError> {
        let name = name.into();
        if key_attrs.is_empty() {
            return Err(StoreError::InvalidSchema(format!(
                "index '{}' has no key columns",
                name
            )));
        }
        let key_schema = table_schema.project(&key_attrs)?;
        Ok(Self {
            oid,
            name,
            metadata: IndexMetadata {
                key_attrs,
                key_schema,
                constraint,
            },
            entries: RwLock::new(BTreeMap::new()),
            writes: AtomicU64::new(0),
        })
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn key_attrs(&self) -> &[ColumnId] {
        &self.metadata.key_attrs
    }

    pub fn key_schema(&self) -> &Schema {
        &self.metadata.key_schema
    }

    pub fn constraint(&self) -> IndexConstraintType {
        self.metadata.constraint
    }

    /// Builds this index's key from a full table tuple.
    pub fn key_of(&self, tuple: &Tuple) -> Vec<Value> {
        tuple.key(&self.metadata.key_attrs)
    }

    /// Returns `true` if any key column is in `columns`.
    pub fn covers_any(&self, columns: &[ColumnId]) -> bool {
        self.metadata.key_attrs.iter().any(|c| columns.contains(c))
    }

    /// Inserts `key -> entry` unconditionally.
    ///
    /// # Returns
    /// `false` if the exact pair was already present.
    pub fn insert_entry(&self, key: Vec<Value>, entry: IndirectionCellRef) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let cells = entries.entry(key).or_default();
        if cells.contains(&entry) {
            return Ok(false);
        }
        cells.push(entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Inserts `key -> entry` unless an existing entry for `key` satisfies
    /// `predicate`.
    ///
    /// `predicate` receives the location each existing cell currently points
    /// at and returns `true` when that version is visible or uncommitted. The
    /// check and the insert happen under one write lock.
    ///
    /// # Returns
    /// `true` if the entry is present after the call.
    pub fn cond_insert_entry<F>(
        &self,
        key: Vec<Value>,
        entry: IndirectionCellRef,
        predicate: F,
    ) -> Result<bool, StoreError>
    where
        F: Fn(ItemPointer) -> bool,
    {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let cells = entries.entry(key).or_default();
        if cells.contains(&entry) {
            return Ok(true);
        }
        let conflict = cells.iter().any(|cell| {
            let location = cell.location();
            !location.is_null() && predicate(location)
        });
        if conflict {
            return Ok(false);
        }
        cells.push(entry);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Removes `key -> entry`.
    ///
    /// # Returns
    /// `true` if the pair existed.
    pub fn delete_entry(&self, key: &[Value], entry: &IndirectionCellRef) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        let Some(cells) = entries.get_mut(key) else {
            return Ok(false);
        };
        let before = cells.len();
        cells.retain(|cell| cell != entry);
        let removed = cells.len() != before;
        if cells.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }

    /// Returns every cell stored under `key`.
    pub fn scan_key(&self, key: &[Value]) -> Result<Vec<IndirectionCellRef>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned().unwrap_or_default())
    }

    /// Returns every `(key, cell)` pair in key order.
    pub fn scan_all(&self) -> Result<Vec<(Vec<Value>, IndirectionCellRef)>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries
            .iter()
            .flat_map(|(key, cells)| cells.iter().map(move |cell| (key.clone(), cell.clone())))
            .collect())
    }

    /// Number of `(key, cell)` pairs currently stored.
    pub fn entry_count(&self) -> Result<usize, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.values().map(Vec::len).sum())
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.clear();
        Ok(())
    }

    /// Number of entries written since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("oid", &self.oid)
            .field("name", &self.name)
            .field("key_attrs", &self.metadata.key_attrs)
            .field("constraint", &self.metadata.constraint)
            .finish()
    }
}
