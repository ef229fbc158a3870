//! Creation and removal of the live and shadow table pairs.

use crate::deadline::{bounded, Operation};
use crate::error::{Phase, ReloadError};
use crate::loader::DEFAULT_OPERATION_TIMEOUT;
use crate::store::ReloadStore;
use crate::types::{Incarnation, LogicalTable};
use std::time::Duration;
use tracing::{debug, info};

/// Drops and creates the `products` / `substitutions` tables of both
/// incarnations. Live and shadow tables get identical definitions.
pub struct SchemaManager<'a, S: ReloadStore> {
    store: &'a S,
    timeout: Duration,
}

impl<'a, S: ReloadStore> SchemaManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Deadline for each DDL statement.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop every live and shadow table that exists, children first, along
    /// with the backend's leftover tables.
    ///
    /// Safe on a pristine database, after a crash, and when repeated. This is
    /// the only operation that drops live tables outside a promotion.
    pub async fn reset(&self) -> Result<(), ReloadError> {
        let mut tables = Incarnation::all_table_names().to_vec();
        tables.extend_from_slice(self.store.leftover_tables());
        self.drop_tables(&tables).await?;
        info!("Reset database");
        Ok(())
    }

    /// Drop the shadow tables and the backend's leftover tables. The live
    /// tables and their rows are left alone.
    pub async fn clear_shadow(&self) -> Result<(), ReloadError> {
        let mut tables = self.store.leftover_tables().to_vec();
        tables.extend_from_slice(&Incarnation::Shadow.table_names());
        self.drop_tables(&tables).await?;
        info!("Cleared buffer tables");
        Ok(())
    }

    /// Create the live tables.
    pub async fn create_live(&self) -> Result<(), ReloadError> {
        for table in LogicalTable::CREATION_ORDER {
            self.create(Incarnation::Live, table).await?;
        }
        info!("Created live tables");
        Ok(())
    }

    /// Create whichever live tables are missing. Existing live tables keep
    /// their rows.
    ///
    /// Returns the number of tables created.
    pub async fn ensure_live(&self) -> Result<usize, ReloadError> {
        let mut created = 0;
        for table in LogicalTable::CREATION_ORDER {
            let name = Incarnation::Live.table_name(table);
            if self.exists(name).await? {
                debug!("Keeping existing live table: {}", name);
                continue;
            }
            self.create(Incarnation::Live, table).await?;
            created += 1;
        }
        if created > 0 {
            info!("Created {} live tables", created);
        }
        Ok(created)
    }

    /// Create the shadow (buffer) tables.
    pub async fn create_shadow(&self) -> Result<(), ReloadError> {
        for table in LogicalTable::CREATION_ORDER {
            self.create(Incarnation::Shadow, table).await?;
        }
        info!("Created buffer tables");
        Ok(())
    }

    async fn drop_tables(&self, tables: &[&'static str]) -> Result<(), ReloadError> {
        for &table in tables {
            debug!("Dropping table if present: {}", table);
            let op = Operation {
                phase: Phase::Schema,
                table,
                name: "drop",
            };
            bounded(
                self.timeout,
                op,
                self.store.drop_table_if_exists(table),
                |e| ReloadError::Schema {
                    table: table.to_string(),
                    operation: "drop",
                    source: e.into(),
                },
            )
            .await?;
        }
        Ok(())
    }

    async fn exists(&self, table: &'static str) -> Result<bool, ReloadError> {
        let op = Operation {
            phase: Phase::Schema,
            table,
            name: "inspect",
        };
        bounded(self.timeout, op, self.store.table_exists(table), |e| {
            ReloadError::Schema {
                table: table.to_string(),
                operation: "inspect",
                source: e.into(),
            }
        })
        .await
    }

    async fn create(&self, incarnation: Incarnation, table: LogicalTable) -> Result<(), ReloadError> {
        let name = incarnation.table_name(table);
        debug!("Creating table: {}", name);
        let op = Operation {
            phase: Phase::Schema,
            table: name,
            name: "create",
        };
        bounded(
            self.timeout,
            op,
            self.store.create_table(incarnation, table),
            |e| ReloadError::Schema {
                table: name.to_string(),
                operation: "create",
                source: e.into(),
            },
        )
        .await
    }
}
