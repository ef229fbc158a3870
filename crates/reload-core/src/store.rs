//! Storage backend abstraction.
//!
//! Backends (PostgreSQL, MySQL, in-memory) implement [`ReloadStore`]; the
//! pipeline is generic over it, so the binary branches once on the backend and
//! everything after that is statically dispatched.

use crate::types::{Incarnation, LogicalTable, Product, Substitution};
use anyhow::Result;
use std::fmt;

/// A borrowed batch of rows for one bulk insert.
#[derive(Debug, Clone, Copy)]
pub enum RowBatch<'a> {
    Products(&'a [Product]),
    Substitutions(&'a [Substitution]),
}

impl RowBatch<'_> {
    pub fn len(&self) -> usize {
        match self {
            RowBatch::Products(rows) => rows.len(),
            RowBatch::Substitutions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> LogicalTable {
        match self {
            RowBatch::Products(_) => LogicalTable::Products,
            RowBatch::Substitutions(_) => LogicalTable::Substitutions,
        }
    }
}

/// The statements a promotion consists of.
///
/// Live tables are dropped children first (the foreign key from
/// `substitutions` to `products` is still active), then each shadow table is
/// renamed to its live name. Backends must apply the whole plan atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    drop_order: [LogicalTable; 2],
    rename_order: [LogicalTable; 2],
}

impl Default for SwapPlan {
    fn default() -> Self {
        Self {
            drop_order: LogicalTable::DROP_ORDER,
            rename_order: LogicalTable::CREATION_ORDER,
        }
    }
}

impl SwapPlan {
    /// Live tables to drop, in order.
    pub fn drops(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drop_order
            .iter()
            .map(|table| Incarnation::Live.table_name(*table))
    }

    /// `(table, from, to)` renames, in order.
    pub fn renames(&self) -> impl Iterator<Item = (LogicalTable, &'static str, &'static str)> + '_ {
        self.rename_order.iter().map(|table| {
            (
                *table,
                Incarnation::Shadow.table_name(*table),
                Incarnation::Live.table_name(*table),
            )
        })
    }
}

/// Discrete connection parameters (the `DB_*` environment variables).
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Where to connect: a backend-native URL or discrete parameters.
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    Url(String),
    Params(ConnectParams),
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // URLs may embed credentials; only print what follows the '@'.
            ConnectTarget::Url(url) => match url.rsplit_once('@') {
                Some((_, host)) => write!(f, "{host}"),
                None => write!(f, "{url}"),
            },
            ConnectTarget::Params(params) => match params.port {
                Some(port) => write!(f, "{}:{}/{}", params.host, port, params.database),
                None => write!(f, "{}/{}", params.host, params.database),
            },
        }
    }
}

/// Operations the reload pipeline needs from a relational store.
///
/// Table names passed in are always physical names produced by
/// [`Incarnation::table_name`].
#[async_trait::async_trait]
pub trait ReloadStore: Send + Sync {
    /// Short backend name for log lines.
    fn backend_name(&self) -> &'static str;

    /// Backend-specific tables a failed promotion can leave behind, children
    /// first. Dropped together with the buffer tables before every run and by
    /// a full reset.
    fn leftover_tables(&self) -> &'static [&'static str] {
        &[]
    }

    /// `DROP TABLE IF EXISTS`.
    async fn drop_table_if_exists(&self, table: &str) -> Result<()>;

    /// Create `table` in `incarnation`: primary key on `id` and, for
    /// substitutions, cascading foreign keys into the products table of the
    /// same incarnation.
    async fn create_table(&self, incarnation: Incarnation, table: LogicalTable) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Insert the whole batch with one statement. Returns rows written.
    async fn insert_rows(&self, table: &str, rows: RowBatch<'_>) -> Result<u64>;

    /// Apply `plan` as one atomic unit.
    async fn promote(&self, plan: &SwapPlan) -> Result<()>;

    async fn row_count(&self, table: &str) -> Result<u64>;

    /// All products of `table`, ordered by id.
    async fn fetch_products(&self, table: &str) -> Result<Vec<Product>>;

    /// All substitutions of `table`, ordered by id.
    async fn fetch_substitutions(&self, table: &str) -> Result<Vec<Substitution>>;
}
