//! [`ReloadStore`] over a mysql_async connection pool.

use crate::{ddl, insert};
use anyhow::{Context, Result};
use mysql_async::{prelude::*, OptsBuilder, Pool};
use reload_core::{
    ConnectTarget, Incarnation, LogicalTable, Product, ReloadStore, RowBatch, Substitution,
    SwapPlan,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// MySQL store. Batch workers each take their own pooled connection.
pub struct MySqlStore {
    pool: Pool,
}

fn uuid_from_bytes(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).context("Expected a 16-byte BINARY id")
}

impl MySqlStore {
    /// Build the pool and check it with `SELECT 1`.
    pub async fn connect(target: &ConnectTarget) -> Result<Self> {
        let pool = match target {
            ConnectTarget::Url(url) => {
                Pool::from_url(url.as_str()).context("Invalid MySQL connection URL")?
            }
            ConnectTarget::Params(params) => {
                let mut opts = OptsBuilder::default()
                    .ip_or_hostname(params.host.clone())
                    .user(Some(params.user.clone()))
                    .pass(Some(params.password.clone()))
                    .db_name(Some(params.database.clone()));
                if let Some(port) = params.port {
                    opts = opts.tcp_port(port);
                }
                Pool::new(opts)
            }
        };

        let mut conn = pool.get_conn().await?;
        conn.query_drop("SELECT 1").await?;
        drop(conn);
        info!("Connected to MySQL at {}", target);

        Ok(Self::with_pool(pool))
    }

    /// Use an existing pool.
    pub fn with_pool(pool: Pool) -> Self {
        Self { pool }
    }

    /// Close all pooled connections.
    pub async fn disconnect(self) -> Result<()> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReloadStore for MySqlStore {
    fn backend_name(&self) -> &'static str {
        "mysql"
    }

    fn leftover_tables(&self) -> &'static [&'static str] {
        &ddl::RETIRED_TABLES
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(ddl::drop_table_if_exists(table)).await?;
        Ok(())
    }

    async fn create_table(&self, incarnation: Incarnation, table: LogicalTable) -> Result<()> {
        let sql = ddl::create_table(incarnation, table);
        debug!("DDL: {}", sql);
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.pool.get_conn().await?;
        let count: Option<i64> = conn
            .exec_first(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?",
                (table,),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn insert_rows(&self, table: &str, rows: RowBatch<'_>) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        insert::insert_batch(&mut conn, table, rows).await
    }

    async fn promote(&self, plan: &SwapPlan) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        for statement in ddl::retired_cleanup(plan) {
            conn.query_drop(statement).await?;
        }

        let rename = ddl::promote_rename(plan);
        debug!("Promotion: {}", rename);
        conn.query_drop(rename.clone())
            .await
            .with_context(|| format!("Failed to execute `{rename}`"))?;

        // The new tables are live at this point; leftovers are removed by the
        // next run or a reset if this fails.
        for statement in ddl::retired_cleanup(plan) {
            if let Err(e) = conn.query_drop(statement.clone()).await {
                warn!("Promotion succeeded but `{}` failed: {}", statement, e);
            }
        }
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let mut conn = self.pool.get_conn().await?;
        let count: Option<u64> = conn
            .query_first(format!("SELECT COUNT(*) FROM `{table}`"))
            .await?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_products(&self, table: &str) -> Result<Vec<Product>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(Vec<u8>, String)> = conn
            .query(format!("SELECT `id`, `name` FROM `{table}` ORDER BY `id`"))
            .await?;
        rows.into_iter()
            .map(|(id, name)| {
                Ok(Product {
                    id: uuid_from_bytes(&id)?,
                    name,
                })
            })
            .collect()
    }

    async fn fetch_substitutions(&self, table: &str) -> Result<Vec<Substitution>> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(Vec<u8>, Vec<u8>, Vec<u8>, i32)> = conn
            .query(format!(
                "SELECT `id`, `product_id`, `swapped_product_id`, `rank` FROM `{table}` ORDER BY `id`"
            ))
            .await?;
        rows.into_iter()
            .map(|(id, product_id, swapped_product_id, rank)| {
                Ok(Substitution {
                    id: uuid_from_bytes(&id)?,
                    product_id: uuid_from_bytes(&product_id)?,
                    swapped_product_id: uuid_from_bytes(&swapped_product_id)?,
                    rank,
                })
            })
            .collect()
    }
}
