//! Database container wiring the catalog, tile group locator, transaction
//! manager and garbage collector together.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::StoreConfig;
use crate::dml::ExecutionContext;
use crate::error::StoreError;
use crate::gc::{GcProvider, NoopGc, VacuumGc};
use crate::index::{Index, IndexConstraintType};
use crate::storage::TileGroupLocator;
use crate::table::{DataTable, FkAction, ForeignKey};
use crate::transaction::{ResultType, TransactionHandle, TransactionManager};
use crate::types::Schema;

/// Owns every shared component of one storage instance.
pub struct Database {
    config: StoreConfig,
    catalog: Catalog,
    locator: Arc<TileGroupLocator>,
    txn_manager: Arc<TransactionManager>,
    gc: Arc<dyn GcProvider>,
    /// Present when garbage collection is enabled
    vacuum: Option<Arc<VacuumGc>>,
}

impl Database {
    /// Creates an empty database.
    ///
    /// # Returns
    /// `StoreError::Config` if `config` fails validation.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let locator = Arc::new(TileGroupLocator::new());
        let (gc, vacuum): (Arc<dyn GcProvider>, Option<Arc<VacuumGc>>) = if config.gc_enabled {
            let vacuum = Arc::new(VacuumGc::new(locator.clone(), config.gc_max_attempts));
            (vacuum.clone(), Some(vacuum))
        } else {
            (Arc::new(NoopGc), None)
        };
        let txn_manager = Arc::new(TransactionManager::new(locator.clone(), gc.clone()));
        info!(
            tuples_per_tile_group = config.tuples_per_tile_group,
            gc_enabled = config.gc_enabled,
            "database created"
        );
        Ok(Self {
            config,
            catalog: Catalog::new(),
            locator,
            txn_manager,
            gc,
            vacuum,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn locator(&self) -> &Arc<TileGroupLocator> {
        &self.locator
    }

    pub fn txn_manager(&self) -> &Arc<TransactionManager> {
        &self.txn_manager
    }

    pub fn vacuum(&self) -> Option<&Arc<VacuumGc>> {
        self.vacuum.as_ref()
    }

    /// Collaborators for `dml` operations against this database.
    pub fn context(&self) -> ExecutionContext<'_> {
        ExecutionContext::new(&self.catalog, &self.txn_manager, self.config.max_cascade_depth)
    }

    /// Creates a table.
    ///
    /// # Arguments
    /// * `name` - Table name
    /// * `schema` - Columns and CHECK constraints
    pub fn create_table(&self, name: &str, schema: Schema) -> Result<Arc<DataTable>, StoreError> {
        if self.catalog.get_table_by_name(name).is_ok() {
            return Err(StoreError::TableAlreadyExists(name.to_string()));
        }
        let table = Arc::new(DataTable::new(
            self.catalog.next_oid(),
            name,
            schema,
            &self.config,
            self.locator.clone(),
            self.gc.clone(),
        )?);
        self.catalog.add_table(table.clone())?;
        Ok(table)
    }

    /// Drops a table, its tile groups and every foreign key that references
    /// it or that it declares.
    pub fn drop_table(&self, name: &str) -> Result<(), StoreError> {
        let table = self.catalog.drop_table(name)?;
        for fk in table.foreign_key_sources()? {
            if let Ok(source) = self.catalog.get_table(fk.source_table_oid) {
                let position = source.foreign_keys()?.iter().position(|f| f.name == fk.name);
                if let Some(position) = position {
                    source.drop_foreign_key(position)?;
                }
            }
        }
        for fk in table.foreign_keys()? {
            if let Ok(sink) = self.catalog.get_table(fk.sink_table_oid) {
                sink.drop_foreign_key_source(&fk.name)?;
            }
        }
        for id in table.tile_group_ids()? {
            self.locator.drop_tile_group(id)?;
        }
        self.gc.deregister_table(table.oid());
        debug!(table = name, "dropped table");
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<Arc<DataTable>, StoreError> {
        self.catalog.get_table_by_name(name)
    }

    /// Creates an index over `columns` of `table` and fills it from the
    /// rows currently visible.
    ///
    /// # Returns
    /// `StoreError::IndexConflict` if existing rows violate a unique index.
    pub fn create_index(
        &self,
        table: &str,
        name: &str,
        columns: &[&str],
        constraint: IndexConstraintType,
    ) -> Result<Arc<Index>, StoreError> {
        let table = self.table(table)?;
        let key_attrs = table.schema().column_ids(columns)?;
        let index = Index::new(self.catalog.next_oid(), name, table.schema(), key_attrs, constraint)?;

        let mut txn = self.txn_manager.begin_transaction()?;
        let rows = table.scan_visible(&txn, &self.txn_manager);
        self.txn_manager.abort_transaction(&mut txn)?;
        let rows = rows?;

        for (location, tuple) in rows {
            let Ok(group) = table.get_tile_group_by_id(location.block) else {
                continue;
            };
            let Some(cell) = group.header().indirection(location.offset) else {
                continue;
            };
            let key = index.key_of(&tuple);
            let duplicate = constraint.is_unique()
                && !key.iter().any(|v| v.is_null())
                && !index.scan_key(&key)?.is_empty();
            if duplicate {
                return Err(StoreError::IndexConflict {
                    index: name.to_string(),
                });
            }
            index.insert_entry(key, cell)?;
        }
        table.add_index(index)
    }

    /// Declares `source(source_columns) REFERENCES sink(sink_columns)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_foreign_key(
        &self,
        name: &str,
        source: &str,
        source_columns: &[&str],
        sink: &str,
        sink_columns: &[&str],
        on_update: FkAction,
        on_delete: FkAction,
    ) -> Result<ForeignKey, StoreError> {
        let source = self.table(source)?;
        let sink = self.table(sink)?;
        let fk = ForeignKey::new(
            name,
            source.oid(),
            source.schema().column_ids(source_columns)?,
            sink.oid(),
            sink.schema().column_ids(sink_columns)?,
            on_update,
            on_delete,
        )?;
        source.add_foreign_key(fk.clone())?;
        sink.register_foreign_key_source(fk.clone())?;
        Ok(fk)
    }

    pub fn begin_transaction(&self) -> Result<TransactionHandle, StoreError> {
        TransactionHandle::begin(self.txn_manager.clone())
    }

    pub fn commit(&self, handle: TransactionHandle) -> Result<ResultType, StoreError> {
        handle.commit()
    }

    pub fn abort(&self, handle: TransactionHandle) -> Result<ResultType, StoreError> {
        handle.abort()
    }

    /// Reclaims versions no running transaction can see.
    ///
    /// # Returns
    /// Number of slots returned for reuse; always 0 with collection disabled.
    pub fn collect_garbage(&self) -> Result<usize, StoreError> {
        let Some(vacuum) = &self.vacuum else {
            return Ok(0);
        };
        let horizon = self.txn_manager.oldest_active_cid()?;
        vacuum.collect(&self.catalog, horizon)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .field("txn_manager", &self.txn_manager)
            .field("vacuum", &self.vacuum)
            .finish()
    }
}
