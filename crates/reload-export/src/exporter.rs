//! Writes the live tables to CSV files.

use crate::error::ExportError;
use csv::WriterBuilder;
use reload_core::loader::DEFAULT_OPERATION_TIMEOUT;
use reload_core::{
    bounded, Incarnation, LogicalTable, Operation, Phase, ReloadError, ReloadStore,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default buffer size for CSV writing.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Metrics from exporting one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportMetrics {
    pub table: LogicalTable,
    pub path: PathBuf,
    /// Data rows written, excluding the header.
    pub rows_written: u64,
    /// Output file size in bytes.
    pub file_size_bytes: u64,
    pub total_duration: Duration,
}

impl ExportMetrics {
    /// Calculate rows per second.
    pub fn rows_per_second(&self) -> f64 {
        if self.total_duration.as_secs_f64() > 0.0 {
            self.rows_written as f64 / self.total_duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Write `columns` as a header followed by one record per row.
///
/// Returns the number of data rows written.
pub fn write_csv<T: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[T],
) -> Result<u64, ExportError> {
    let file = File::create(path)?;
    let buf_writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    // The header comes from the table definition so an empty table still gets one.
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(buf_writer);

    writer.write_record(columns)?;
    for (written, row) in rows.iter().enumerate() {
        writer.serialize(row)?;
        if (written + 1) % 10000 == 0 {
            debug!("Written {} rows to {}", written + 1, path.display());
        }
    }

    writer.flush()?;
    let inner = writer.into_inner().map_err(|e| e.into_error())?;
    drop(inner);
    Ok(rows.len() as u64)
}

/// Exports the live tables into a directory.
pub struct CsvExporter {
    dir: PathBuf,
    timeout: Duration,
}

impl CsvExporter {
    /// Create an exporter writing into `dir`, which is created if missing.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let metrics = CsvExporter::new("/tmp/export").export_all(&store).await?;
    /// ```
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Deadline for reading each table.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<table>.csv`
    pub fn path_for(&self, table: LogicalTable) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    /// Export both live tables, parents first.
    pub async fn export_all<S: ReloadStore>(
        &self,
        store: &S,
    ) -> Result<Vec<ExportMetrics>, ReloadError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| ReloadError::Export {
            table: self.dir.display().to_string(),
            source: Box::new(e),
        })?;

        let mut metrics = Vec::with_capacity(LogicalTable::CREATION_ORDER.len());
        for table in LogicalTable::CREATION_ORDER {
            metrics.push(self.export_table(store, table).await?);
        }
        Ok(metrics)
    }

    /// Export one live table.
    pub async fn export_table<S: ReloadStore>(
        &self,
        store: &S,
        table: LogicalTable,
    ) -> Result<ExportMetrics, ReloadError> {
        let start_time = Instant::now();
        let name = Incarnation::Live.table_name(table);
        let path = self.path_for(table);
        info!("Exporting '{}' to '{}'", name, path.display());

        let op = Operation {
            phase: Phase::Export,
            table: name,
            name: "read",
        };
        let on_error = |e: anyhow::Error| ReloadError::Export {
            table: name.to_string(),
            source: e.into(),
        };
        let written = match table {
            LogicalTable::Products => {
                let rows = bounded(self.timeout, op, store.fetch_products(name), on_error).await?;
                write_csv(&path, table.columns(), &rows)
            }
            LogicalTable::Substitutions => {
                let rows =
                    bounded(self.timeout, op, store.fetch_substitutions(name), on_error).await?;
                write_csv(&path, table.columns(), &rows)
            }
        }
        .map_err(|e| ReloadError::Export {
            table: name.to_string(),
            source: Box::new(e),
        })?;

        let file_size_bytes = std::fs::metadata(&path)
            .map_err(|e| ReloadError::Export {
                table: name.to_string(),
                source: Box::new(e),
            })?
            .len();
        let metrics = ExportMetrics {
            table,
            path,
            rows_written: written,
            file_size_bytes,
            total_duration: start_time.elapsed(),
        };
        info!(
            "Export complete: {} rows, {} bytes in {:?} ({:.2} rows/sec)",
            metrics.rows_written,
            metrics.file_size_bytes,
            metrics.total_duration,
            metrics.rows_per_second()
        );
        Ok(metrics)
    }
}
