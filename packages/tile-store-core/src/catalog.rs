//! Registry of tables by oid and name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::storage::Oid;
use crate::table::DataTable;

#[derive(Debug, Default)]
struct CatalogInner {
    by_oid: HashMap<Oid, Arc<DataTable>>,
    by_name: HashMap<String, Oid>,
}

/// Table registry shared by the executors and the garbage collector.
#[derive(Debug)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
    next_oid: AtomicU32,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CatalogInner::default()),
            next_oid: AtomicU32::new(1),
        }
    }

    /// Hands out a table or index oid.
    pub fn next_oid(&self) -> Oid {
        self.next_oid.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a table.
    ///
    /// # Returns
    /// `StoreError::TableAlreadyExists` if the name or oid is taken.
    pub fn add_table(&self, table: Arc<DataTable>) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        if inner.by_name.contains_key(table.name()) || inner.by_oid.contains_key(&table.oid()) {
            return Err(StoreError::TableAlreadyExists(table.name().to_string()));
        }
        inner.by_name.insert(table.name().to_string(), table.oid());
        inner.by_oid.insert(table.oid(), table);
        Ok(())
    }

    pub fn get_table(&self, oid: Oid) -> Result<Arc<DataTable>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        inner
            .by_oid
            .get(&oid)
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(format!("oid {}", oid)))
    }

    pub fn get_table_by_name(&self, name: &str) -> Result<Arc<DataTable>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        inner
            .by_name
            .get(name)
            .and_then(|oid| inner.by_oid.get(oid))
            .cloned()
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    /// Unregisters a table by name and returns it.
    pub fn drop_table(&self, name: &str) -> Result<Arc<DataTable>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        let oid = inner
            .by_name
            .remove(name)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
        inner
            .by_oid
            .remove(&oid)
            .ok_or_else(|| StoreError::TableNotFound(name.to_string()))
    }

    /// Every registered table, ordered by oid.
    pub fn tables(&self) -> Result<Vec<Arc<DataTable>>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut tables: Vec<_> = inner.by_oid.values().cloned().collect();
        tables.sort_by_key(|t| t.oid());
        Ok(tables)
    }

    pub fn table_count(&self) -> usize {
        self.inner.read().map(|i| i.by_oid.len()).unwrap_or(0)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
