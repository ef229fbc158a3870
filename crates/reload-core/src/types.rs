//! Row and table types for the catalog dataset.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// A synthetic product. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
}

/// "For `product_id`, consider `swapped_product_id` as the `rank`-th alternative."
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    pub id: Uuid,
    pub product_id: Uuid,
    pub swapped_product_id: Uuid,
    pub rank: i32,
}

/// One of the two logical tables of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalTable {
    Products,
    Substitutions,
}

impl LogicalTable {
    /// Creation order: parents before children.
    pub const CREATION_ORDER: [LogicalTable; 2] = [LogicalTable::Products, LogicalTable::Substitutions];

    /// Drop order: children before parents, so foreign keys never dangle.
    pub const DROP_ORDER: [LogicalTable; 2] = [LogicalTable::Substitutions, LogicalTable::Products];

    /// Column names in insert/export order.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            LogicalTable::Products => &["id", "name"],
            LogicalTable::Substitutions => &["id", "product_id", "swapped_product_id", "rank"],
        }
    }
}

impl fmt::Display for LogicalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Incarnation::Live.table_name(*self))
    }
}

/// Physical incarnation of a logical table.
///
/// `Live` tables are what external readers query; `Shadow` tables are the
/// buffers populated in the background and renamed into place on promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Incarnation {
    Live,
    Shadow,
}

impl Incarnation {
    /// Physical table name of `table` in this incarnation.
    pub fn table_name(self, table: LogicalTable) -> &'static str {
        match (self, table) {
            (Incarnation::Live, LogicalTable::Products) => "products",
            (Incarnation::Live, LogicalTable::Substitutions) => "substitutions",
            (Incarnation::Shadow, LogicalTable::Products) => "products_buffer",
            (Incarnation::Shadow, LogicalTable::Substitutions) => "substitutions_buffer",
        }
    }

    /// This incarnation's physical table names, children first.
    pub fn table_names(self) -> [&'static str; 2] {
        LogicalTable::DROP_ORDER.map(|table| self.table_name(table))
    }

    /// Whether `name` is one of this incarnation's physical tables.
    pub fn owns(self, name: &str) -> bool {
        self.table_names().contains(&name)
    }

    /// Every physical table name, children first.
    pub fn all_table_names() -> [&'static str; 4] {
        [
            Incarnation::Live.table_name(LogicalTable::Substitutions),
            Incarnation::Live.table_name(LogicalTable::Products),
            Incarnation::Shadow.table_name(LogicalTable::Substitutions),
            Incarnation::Shadow.table_name(LogicalTable::Products),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(Incarnation::Live.table_name(LogicalTable::Products), "products");
        assert_eq!(
            Incarnation::Shadow.table_name(LogicalTable::Substitutions),
            "substitutions_buffer"
        );
        assert_eq!(LogicalTable::Substitutions.to_string(), "substitutions");
    }

    #[test]
    fn test_all_table_names_children_first() {
        assert_eq!(
            Incarnation::all_table_names(),
            ["substitutions", "products", "substitutions_buffer", "products_buffer"]
        );
    }

    #[test]
    fn test_owns_only_its_own_tables() {
        assert_eq!(Incarnation::Shadow.table_names(), ["substitutions_buffer", "products_buffer"]);
        assert!(Incarnation::Live.owns("products"));
        assert!(!Incarnation::Live.owns("products_buffer"));
        assert!(!Incarnation::Shadow.owns("products_retired"));
    }
}
