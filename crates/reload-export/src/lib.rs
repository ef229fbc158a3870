//! CSV export of the live `products` and `substitutions` tables.
//!
//! Each table is written to `<dir>/<table>.csv` with a header row followed by
//! one row per record, in id order.

mod error;
mod exporter;

pub use error::ExportError;
pub use exporter::{write_csv, CsvExporter, ExportMetrics, DEFAULT_BUFFER_SIZE};
