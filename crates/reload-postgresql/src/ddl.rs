//! DDL for the products/substitutions table pairs.

use reload_core::{Incarnation, LogicalTable, SwapPlan};

fn column_types(table: LogicalTable) -> &'static [(&'static str, &'static str)] {
    match table {
        LogicalTable::Products => &[("id", "UUID"), ("name", "VARCHAR(255)")],
        LogicalTable::Substitutions => &[
            ("id", "UUID"),
            ("product_id", "UUID"),
            ("swapped_product_id", "UUID"),
            ("rank", "INTEGER"),
        ],
    }
}

/// Suffixes of the named constraints on `table`; the full name is
/// `<physical table>_<suffix>`.
pub fn constraint_suffixes(table: LogicalTable) -> &'static [&'static str] {
    match table {
        LogicalTable::Products => &["pkey"],
        LogicalTable::Substitutions => &[
            "pkey",
            "product_id_rank_key",
            "product_id_fkey",
            "swapped_product_id_fkey",
            "no_self_check",
        ],
    }
}

/// CREATE TABLE for `table` in `incarnation`.
///
/// Constraints are named after the physical table so they can be renamed
/// along with it on promotion.
pub fn create_table(incarnation: Incarnation, table: LogicalTable) -> String {
    let name = incarnation.table_name(table);
    let mut defs: Vec<String> = column_types(table)
        .iter()
        .map(|(column, sql_type)| format!("  \"{column}\" {sql_type} NOT NULL"))
        .collect();
    defs.push(format!("  CONSTRAINT \"{name}_pkey\" PRIMARY KEY (\"id\")"));

    if table == LogicalTable::Substitutions {
        let parent = incarnation.table_name(LogicalTable::Products);
        defs.push(format!(
            "  CONSTRAINT \"{name}_product_id_rank_key\" UNIQUE (\"product_id\", \"rank\")"
        ));
        for column in ["product_id", "swapped_product_id"] {
            defs.push(format!(
                "  CONSTRAINT \"{name}_{column}_fkey\" FOREIGN KEY (\"{column}\") \
                 REFERENCES \"{parent}\" (\"id\") ON DELETE CASCADE ON UPDATE CASCADE"
            ));
        }
        defs.push(format!(
            "  CONSTRAINT \"{name}_no_self_check\" CHECK (\"product_id\" <> \"swapped_product_id\")"
        ));
    }

    format!("CREATE TABLE \"{name}\" (\n{}\n)", defs.join(",\n"))
}

pub fn drop_table_if_exists(table: &str) -> String {
    format!("DROP TABLE IF EXISTS \"{table}\"")
}

/// Statements of a promotion, in execution order. Run inside one transaction.
pub fn promote_statements(plan: &SwapPlan) -> Vec<String> {
    let mut statements: Vec<String> = plan
        .drops()
        .map(|table| format!("DROP TABLE \"{table}\""))
        .collect();

    for (table, from, to) in plan.renames() {
        statements.push(format!("ALTER TABLE \"{from}\" RENAME TO \"{to}\""));
        for suffix in constraint_suffixes(table) {
            statements.push(format!(
                "ALTER TABLE \"{to}\" RENAME CONSTRAINT \"{from}_{suffix}\" TO \"{to}_{suffix}\""
            ));
        }
    }
    statements
}
