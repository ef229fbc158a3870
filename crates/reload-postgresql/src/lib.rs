//! PostgreSQL backend for the catalog reload pipeline.
//!
//! PostgreSQL has transactional DDL, so a promotion is a single transaction
//! that drops the live tables (children first), renames the buffer tables
//! into their place, and renames their constraints to match.

pub mod ddl;
pub mod insert;
mod store;

pub use store::PostgresStore;
