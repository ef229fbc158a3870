//! Multi-row INSERT statements for PostgreSQL.

use anyhow::{bail, Result};
use reload_core::RowBatch;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

/// Bind parameters one statement may carry.
pub const MAX_PARAMETERS: usize = 65_535;

/// `INSERT INTO "table" ("a", "b") VALUES ($1, $2), ($3, $4), ...`
pub fn insert_statement(table: &str, columns: &[&str], row_count: usize) -> String {
    let col_count = columns.len();
    let placeholders: Vec<String> = (0..row_count)
        .map(|row| {
            let params: Vec<String> = (1..=col_count)
                .map(|col| format!("${}", row * col_count + col))
                .collect();
            format!("({})", params.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table,
        columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", "),
        placeholders.join(", ")
    )
}

/// Insert a whole batch with one statement.
pub async fn insert_batch(client: &Client, table: &str, rows: RowBatch<'_>) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let columns = rows.table().columns();
    if rows.len() * columns.len() > MAX_PARAMETERS {
        bail!(
            "batch of {} rows exceeds the PostgreSQL limit of {} parameters per statement",
            rows.len(),
            MAX_PARAMETERS
        );
    }

    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(rows.len() * columns.len());
    match rows {
        RowBatch::Products(products) => {
            for product in products {
                params.push(&product.id);
                params.push(&product.name);
            }
        }
        RowBatch::Substitutions(substitutions) => {
            for sub in substitutions {
                params.push(&sub.id);
                params.push(&sub.product_id);
                params.push(&sub.swapped_product_id);
                params.push(&sub.rank);
            }
        }
    }

    let sql = insert_statement(table, columns, rows.len());
    client.execute(&sql, &params).await?;
    Ok(rows.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_placeholders() {
        let sql = insert_statement("products_buffer", &["id", "name"], 3);
        assert_eq!(
            sql,
            "INSERT INTO \"products_buffer\" (\"id\", \"name\") VALUES ($1, $2), ($3, $4), ($5, $6)"
        );
    }

    #[test]
    fn test_insert_statement_four_columns() {
        let sql = insert_statement(
            "substitutions_buffer",
            &["id", "product_id", "swapped_product_id", "rank"],
            2,
        );
        assert!(sql.ends_with("VALUES ($1, $2, $3, $4), ($5, $6, $7, $8)"));
    }
}
