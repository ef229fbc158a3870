//! MySQL backend for the catalog reload pipeline.
//!
//! MySQL commits DDL implicitly, so a promotion cannot be a transaction.
//! Instead it is a single multi-table `RENAME TABLE`, which MySQL applies
//! atomically: the live tables move aside to `*_retired` names and the buffer
//! tables take their place in one step. The retired tables are dropped
//! afterwards.

pub mod ddl;
pub mod insert;
mod store;

pub use store::MySqlStore;
