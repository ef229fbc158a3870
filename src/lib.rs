//! catalog-reload library
//!
//! Regenerates the `products` / `substitutions` dataset into buffer tables
//! and promotes them to the live names in one atomic step, then exports the
//! live tables to CSV.
//!
//! # Crates
//!
//! - `reload_core` - identifiers, synthesis, batch loading, schema and swap
//!   coordination, the in-memory store
//! - `reload_postgresql` - PostgreSQL store (transactional promotion)
//! - `reload_mysql` - MySQL store (multi-table `RENAME TABLE` promotion)
//! - `reload_export` - CSV export
//!
//! # CLI Usage
//!
//! ```bash
//! # Full reload against PostgreSQL, exporting to ./export
//! catalog-reload run --backend postgresql \
//!   --connection-string "host=localhost user=postgres password=postgres dbname=catalog"
//!
//! # MySQL from DB_* variables, verifying before export
//! DB_HOST=localhost DB_DATABASE=catalog DB_USER=root DB_PASSWORD=root \
//!   catalog-reload run --backend mysql --verify
//!
//! # Recover from a failed run
//! catalog-reload reset --backend postgresql --connection-string "..."
//! ```

pub mod config;
pub mod connect;
pub mod reload;

pub use config::{Backend, ConnectionArgs, GenerateArgs, ReloadConfig, RunArgs, RuntimeArgs};
pub use reload::{run_export, run_reload, run_reset, run_verify, ReloadReport};
