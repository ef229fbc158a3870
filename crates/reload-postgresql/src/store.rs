//! [`ReloadStore`] over a tokio-postgres client.

use crate::{ddl, insert};
use anyhow::{Context, Result};
use reload_core::{
    ConnectTarget, Incarnation, LogicalTable, Product, ReloadStore, RowBatch, Substitution,
    SwapPlan,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, info};

/// PostgreSQL store backed by a single client connection.
///
/// Queries share the client and are pipelined over the connection, so
/// concurrent batch workers overlap. Promotion takes the client exclusively
/// because its transaction must not interleave with other statements.
pub struct PostgresStore {
    client: Arc<RwLock<Client>>,
}

impl PostgresStore {
    /// Connect and check the connection with `SELECT 1`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = PostgresStore::connect(&ConnectTarget::Url(
    ///     "host=localhost user=postgres password=postgres dbname=catalog".into(),
    /// ))
    /// .await?;
    /// ```
    pub async fn connect(target: &ConnectTarget) -> Result<Self> {
        let config = match target {
            ConnectTarget::Url(url) => url
                .parse::<Config>()
                .context("Invalid PostgreSQL connection string")?,
            ConnectTarget::Params(params) => {
                let mut config = Config::new();
                config
                    .host(&params.host)
                    .dbname(&params.database)
                    .user(&params.user)
                    .password(&params.password);
                if let Some(port) = params.port {
                    config.port(port);
                }
                config
            }
        };

        let (client, connection) = config.connect(NoTls).await?;

        // Spawn the connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        // Test connection
        client.simple_query("SELECT 1").await?;
        info!("Connected to PostgreSQL at {}", target);

        Ok(Self::with_client(Arc::new(RwLock::new(client))))
    }

    /// Use an existing client.
    pub fn with_client(client: Arc<RwLock<Client>>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ReloadStore for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgresql"
    }

    async fn drop_table_if_exists(&self, table: &str) -> Result<()> {
        let client = self.client.read().await;
        client.execute(&ddl::drop_table_if_exists(table), &[]).await?;
        Ok(())
    }

    async fn create_table(&self, incarnation: Incarnation, table: LogicalTable) -> Result<()> {
        let sql = ddl::create_table(incarnation, table);
        debug!("DDL: {}", sql);
        let client = self.client.read().await;
        client.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.client.read().await;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1)",
                &[&table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn insert_rows(&self, table: &str, rows: RowBatch<'_>) -> Result<u64> {
        let client = self.client.read().await;
        insert::insert_batch(&client, table, rows).await
    }

    async fn promote(&self, plan: &SwapPlan) -> Result<()> {
        let mut client = self.client.write().await;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin promotion transaction")?;
        for statement in ddl::promote_statements(plan) {
            debug!("Promotion: {}", statement);
            tx.batch_execute(&statement)
                .await
                .with_context(|| format!("Failed to execute `{statement}`"))?;
        }
        tx.commit()
            .await
            .context("Failed to commit promotion transaction")?;
        Ok(())
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let client = self.client.read().await;
        let sql = format!("SELECT COUNT(*) FROM \"{table}\"");
        let row = client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn fetch_products(&self, table: &str) -> Result<Vec<Product>> {
        let client = self.client.read().await;
        let sql = format!("SELECT \"id\", \"name\" FROM \"{table}\" ORDER BY \"id\"");
        let rows = client.query(&sql, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| Product {
                id: row.get(0),
                name: row.get(1),
            })
            .collect())
    }

    async fn fetch_substitutions(&self, table: &str) -> Result<Vec<Substitution>> {
        let client = self.client.read().await;
        let sql = format!(
            "SELECT \"id\", \"product_id\", \"swapped_product_id\", \"rank\" FROM \"{table}\" ORDER BY \"id\""
        );
        let rows = client.query(&sql, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| Substitution {
                id: row.get(0),
                product_id: row.get(1),
                swapped_product_id: row.get(2),
                rank: row.get(3),
            })
            .collect())
    }
}
