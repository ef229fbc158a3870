//! In-memory [`ReloadStore`] for tests and dry runs.
//!
//! Behaves like a transactional-DDL database for the subset the pipeline
//! uses: tables must exist before use, primary keys are unique, foreign keys
//! are checked on insert and block dropping a referenced table, renames carry
//! foreign keys along, and a promotion is applied all-or-nothing under one
//! lock so concurrent readers see either the old or the new tables.

use crate::store::{ReloadStore, RowBatch, SwapPlan};
use crate::types::{Incarnation, LogicalTable, Product, Substitution};
use anyhow::{anyhow, bail, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// An injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    /// Fail creating `table`.
    Create { table: String },
    /// Fail inserting into `table` once `after_batches` inserts succeeded.
    Insert { table: String, after_batches: u64 },
    /// Fail the next promotion.
    Promote,
}

#[derive(Debug, Clone)]
enum MemTable {
    Products(BTreeMap<Uuid, Product>),
    Substitutions {
        references: String,
        rows: BTreeMap<Uuid, Substitution>,
    },
}

impl MemTable {
    fn len(&self) -> usize {
        match self {
            MemTable::Products(rows) => rows.len(),
            MemTable::Substitutions { rows, .. } => rows.len(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemTable>,
    fail_point: Option<FailPoint>,
    insert_calls: HashMap<String, u64>,
}

fn check_droppable(tables: &HashMap<String, MemTable>, table: &str) -> Result<()> {
    let dependents = tables.iter().find(|(name, t)| {
        name.as_str() != table
            && matches!(t, MemTable::Substitutions { references, .. } if references == table)
    });
    if let Some((dependent, _)) = dependents {
        bail!("cannot drop table {table} because table {dependent} depends on it");
    }
    Ok(())
}

/// In-memory store. See the module docs for the semantics it enforces.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    promote_delay: Duration,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the promotion lock for `delay`, to widen the window concurrent
    /// readers could observe.
    pub fn with_promote_delay(mut self, delay: Duration) -> Self {
        self.promote_delay = delay;
        self
    }

    /// Arm a failure.
    pub async fn fail_at(&self, fail_point: FailPoint) {
        self.state.lock().await.fail_point = Some(fail_point);
    }

    /// Clear an armed failure.
    pub async fn disarm(&self) {
        self.state.lock().await.fail_point = None;
    }

    /// Number of successful bulk inserts into `table`.
    pub async fn insert_calls(&self, table: &str) -> u64 {
        self.state
            .lock()
            .await
            .insert_calls
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    /// Names of all existing tables, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().await.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait::async_trait]
impl ReloadStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.tables.contains_key(table) {
            check_droppable(&state.tables, table)?;
            state.tables.remove(table);
        }
        Ok(())
    }

    async fn create_table(&self, incarnation: Incarnation, table: LogicalTable) -> Result<()> {
        let mut state = self.state.lock().await;
        let name = incarnation.table_name(table);

        if let Some(FailPoint::Create { table: failing }) = &state.fail_point {
            if failing == name {
                bail!("injected failure creating {name}");
            }
        }
        if state.tables.contains_key(name) {
            bail!("relation \"{name}\" already exists");
        }

        let created = match table {
            LogicalTable::Products => MemTable::Products(BTreeMap::new()),
            LogicalTable::Substitutions => {
                let references = incarnation.table_name(LogicalTable::Products);
                if !matches!(state.tables.get(references), Some(MemTable::Products(_))) {
                    bail!("referenced relation \"{references}\" does not exist");
                }
                MemTable::Substitutions {
                    references: references.to_string(),
                    rows: BTreeMap::new(),
                }
            }
        };
        state.tables.insert(name.to_string(), created);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.state.lock().await.tables.contains_key(table))
    }

    async fn insert_rows(&self, table: &str, rows: RowBatch<'_>) -> Result<u64> {
        let mut state = self.state.lock().await;

        if let Some(FailPoint::Insert {
            table: failing,
            after_batches,
        }) = &state.fail_point
        {
            let done = state.insert_calls.get(table).copied().unwrap_or(0);
            if failing == table && done >= *after_batches {
                bail!("injected failure inserting into {table}");
            }
        }

        let MemoryState { tables, .. } = &mut *state;
        let references = match tables.get(table) {
            None => bail!("relation \"{table}\" does not exist"),
            Some(MemTable::Substitutions { references, .. }) => Some(references.clone()),
            Some(MemTable::Products(_)) => None,
        };

        // Validate the whole batch before touching the table.
        match (rows, references) {
            (RowBatch::Products(batch), None) => {
                let Some(MemTable::Products(existing)) = tables.get(table) else {
                    bail!("relation \"{table}\" does not exist");
                };
                let mut seen = HashSet::new();
                for product in batch {
                    if existing.contains_key(&product.id) || !seen.insert(product.id) {
                        bail!("duplicate key value violates unique constraint on {table}");
                    }
                }
            }
            (RowBatch::Substitutions(batch), Some(references)) => {
                let Some(MemTable::Products(parents)) = tables.get(&references) else {
                    bail!("referenced relation \"{references}\" does not exist");
                };
                let Some(MemTable::Substitutions { rows: existing, .. }) = tables.get(table) else {
                    bail!("relation \"{table}\" does not exist");
                };
                let mut seen = HashSet::new();
                for sub in batch {
                    for key in [sub.product_id, sub.swapped_product_id] {
                        if !parents.contains_key(&key) {
                            bail!("insert into {table} violates foreign key: {key} not present in {references}");
                        }
                    }
                    if existing.contains_key(&sub.id) || !seen.insert(sub.id) {
                        bail!("duplicate key value violates unique constraint on {table}");
                    }
                }
            }
            (batch, _) => bail!("cannot insert {} rows into {table}", batch.table()),
        }

        match (tables.get_mut(table), rows) {
            (Some(MemTable::Products(existing)), RowBatch::Products(batch)) => {
                existing.extend(batch.iter().map(|p| (p.id, p.clone())));
            }
            (Some(MemTable::Substitutions { rows: existing, .. }), RowBatch::Substitutions(batch)) => {
                existing.extend(batch.iter().map(|s| (s.id, s.clone())));
            }
            (_, batch) => bail!("cannot insert {} rows into {table}", batch.table()),
        }

        *state.insert_calls.entry(table.to_string()).or_insert(0) += 1;
        Ok(rows.len() as u64)
    }

    async fn promote(&self, plan: &SwapPlan) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.promote_delay > Duration::ZERO {
            tokio::time::sleep(self.promote_delay).await;
        }
        if state.fail_point == Some(FailPoint::Promote) {
            bail!("injected failure during promotion");
        }

        // Work on a copy; the original survives any failure untouched.
        let mut tables = state.tables.clone();
        for table in plan.drops() {
            if !tables.contains_key(table) {
                bail!("table \"{table}\" does not exist");
            }
            check_droppable(&tables, table)?;
            tables.remove(table);
        }
        for (_, from, to) in plan.renames() {
            if tables.contains_key(to) {
                bail!("relation \"{to}\" already exists");
            }
            let moved = tables
                .remove(from)
                .ok_or_else(|| anyhow!("relation \"{from}\" does not exist"))?;
            tables.insert(to.to_string(), moved);
            for t in tables.values_mut() {
                if let MemTable::Substitutions { references, .. } = t {
                    if references == from {
                        *references = to.to_string();
                    }
                }
            }
        }

        state.tables = tables;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let state = self.state.lock().await;
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| anyhow!("relation \"{table}\" does not exist"))?;
        Ok(t.len() as u64)
    }

    async fn fetch_products(&self, table: &str) -> Result<Vec<Product>> {
        match self.state.lock().await.tables.get(table) {
            Some(MemTable::Products(rows)) => Ok(rows.values().cloned().collect()),
            Some(_) => bail!("{table} is not a products table"),
            None => bail!("relation \"{table}\" does not exist"),
        }
    }

    async fn fetch_substitutions(&self, table: &str) -> Result<Vec<Substitution>> {
        match self.state.lock().await.tables.get(table) {
            Some(MemTable::Substitutions { rows, .. }) => Ok(rows.values().cloned().collect()),
            Some(_) => bail!("{table} is not a substitutions table"),
            None => bail!("relation \"{table}\" does not exist"),
        }
    }
}
