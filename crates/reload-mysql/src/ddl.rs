//! DDL for the products/substitutions table pairs.
//!
//! Foreign keys are left unnamed so InnoDB generates `<table>_ibfk_<n>`
//! names, which it rewrites when the table is renamed. A CHECK constraint on
//! `product_id <> swapped_product_id` is not possible here: MySQL rejects
//! CHECK constraints on columns that carry cascading foreign key actions.

use reload_core::{Incarnation, LogicalTable, SwapPlan};

/// Suffix of the names the live tables are moved to during promotion.
pub const RETIRED_SUFFIX: &str = "_retired";

/// Names the live tables carry between the promotion rename and the cleanup
/// that follows it, children first.
pub const RETIRED_TABLES: [&str; 2] = ["substitutions_retired", "products_retired"];

fn column_types(table: LogicalTable) -> &'static [(&'static str, &'static str)] {
    match table {
        LogicalTable::Products => &[("id", "BINARY(16)"), ("name", "VARCHAR(255)")],
        LogicalTable::Substitutions => &[
            ("id", "BINARY(16)"),
            ("product_id", "BINARY(16)"),
            ("swapped_product_id", "BINARY(16)"),
            ("rank", "INT"),
        ],
    }
}

/// CREATE TABLE for `table` in `incarnation`.
pub fn create_table(incarnation: Incarnation, table: LogicalTable) -> String {
    let name = incarnation.table_name(table);
    let mut defs: Vec<String> = column_types(table)
        .iter()
        .map(|(column, sql_type)| format!("  `{column}` {sql_type} NOT NULL"))
        .collect();
    defs.push("  PRIMARY KEY (`id`)".to_string());

    if table == LogicalTable::Substitutions {
        let parent = incarnation.table_name(LogicalTable::Products);
        defs.push("  UNIQUE KEY `product_id_rank` (`product_id`, `rank`)".to_string());
        for column in ["product_id", "swapped_product_id"] {
            defs.push(format!(
                "  FOREIGN KEY (`{column}`) REFERENCES `{parent}` (`id`) \
                 ON DELETE CASCADE ON UPDATE CASCADE"
            ));
        }
    }

    format!(
        "CREATE TABLE `{name}` (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
        defs.join(",\n")
    )
}

pub fn drop_table_if_exists(table: &str) -> String {
    format!("DROP TABLE IF EXISTS `{table}`")
}

/// `substitutions_retired` for `substitutions`.
pub fn retired_name(live: &str) -> String {
    format!("{live}{RETIRED_SUFFIX}")
}

/// Leftovers of an interrupted promotion, children first.
pub fn retired_cleanup(plan: &SwapPlan) -> Vec<String> {
    plan.drops()
        .map(|table| drop_table_if_exists(&retired_name(table)))
        .collect()
}

/// The atomic rename: live tables out, buffer tables in.
pub fn promote_rename(plan: &SwapPlan) -> String {
    let mut pairs: Vec<String> = plan
        .drops()
        .map(|table| format!("`{table}` TO `{}`", retired_name(table)))
        .collect();
    pairs.extend(
        plan.renames()
            .map(|(_, from, to)| format!("`{from}` TO `{to}`")),
    );
    format!("RENAME TABLE {}", pairs.join(", "))
}
