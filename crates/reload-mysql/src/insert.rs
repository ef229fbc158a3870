//! Batched INSERT logic for MySQL.

use anyhow::Result;
use mysql_async::{prelude::*, Conn, Params, Value};
use reload_core::RowBatch;
use uuid::Uuid;

/// `INSERT INTO `table` (`a`, `b`) VALUES (?, ?), (?, ?), ...`
pub fn insert_statement(table: &str, columns: &[&str], row_count: usize) -> String {
    let col_placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    let row_template = format!("({})", col_placeholders.join(", "));
    let rows_template: Vec<&str> = (0..row_count).map(|_| row_template.as_str()).collect();

    format!(
        "INSERT INTO `{}` ({}) VALUES {}",
        table,
        columns
            .iter()
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", "),
        rows_template.join(", ")
    )
}

fn uuid_value(id: &Uuid) -> Value {
    Value::Bytes(id.as_bytes().to_vec())
}

/// Positional parameters for `rows`, row-major in column order.
pub fn batch_params(rows: RowBatch<'_>) -> Vec<Value> {
    let mut params = Vec::with_capacity(rows.len() * rows.table().columns().len());
    match rows {
        RowBatch::Products(products) => {
            for product in products {
                params.push(uuid_value(&product.id));
                params.push(Value::from(product.name.as_str()));
            }
        }
        RowBatch::Substitutions(substitutions) => {
            for sub in substitutions {
                params.push(uuid_value(&sub.id));
                params.push(uuid_value(&sub.product_id));
                params.push(uuid_value(&sub.swapped_product_id));
                params.push(Value::Int(i64::from(sub.rank)));
            }
        }
    }
    params
}

/// Insert a whole batch with one statement.
pub async fn insert_batch(conn: &mut Conn, table: &str, rows: RowBatch<'_>) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let sql = insert_statement(table, rows.table().columns(), rows.len());
    conn.exec_drop(&sql, Params::Positional(batch_params(rows)))
        .await?;
    Ok(rows.len() as u64)
}
