//! Orchestration of the subcommands over any [`ReloadStore`].

use crate::config::ReloadConfig;
use reload_core::{
    run_pipeline, verify_live, ReloadError, ReloadStore, RunSummary, SchemaManager, VerifyReport,
};
use reload_export::{CsvExporter, ExportMetrics};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Outcome of a full reload.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub summary: RunSummary,
    /// Present when verification was requested.
    pub verification: Option<VerifyReport>,
    /// Empty when the export was skipped.
    pub exports: Vec<ExportMetrics>,
}

/// Reload the dataset, then optionally verify and export the live tables.
///
/// Failures are returned to the caller untouched; nothing here exits the
/// process.
pub async fn run_reload<S: ReloadStore>(
    store: &S,
    config: &ReloadConfig,
) -> Result<ReloadReport, ReloadError> {
    config.validate()?;
    let timeout = config.pipeline.operation_timeout;

    let summary = run_pipeline(store, &config.pipeline).await?;

    let verification = if config.verify {
        Some(run_verify(store, timeout).await?)
    } else {
        None
    };

    let exports = match &config.export_dir {
        Some(dir) => run_export(store, dir, timeout).await?,
        None => {
            info!("Skipping export");
            Vec::new()
        }
    };

    info!(
        "Run summary: {} products in {} batches, {} substitutions in {} batches; load {:?}, promotion {:?}, total {:?}",
        summary.products.rows,
        summary.products.batches,
        summary.substitutions.rows,
        summary.substitutions.batches,
        summary.load_duration,
        summary.promote_duration,
        summary.total_duration
    );

    Ok(ReloadReport {
        summary,
        verification,
        exports,
    })
}

/// Drop every live and buffer table.
pub async fn run_reset<S: ReloadStore>(store: &S, timeout: Duration) -> Result<(), ReloadError> {
    SchemaManager::new(store).with_timeout(timeout).reset().await
}

/// Export the current live tables without reloading.
pub async fn run_export<S: ReloadStore>(
    store: &S,
    dir: &Path,
    timeout: Duration,
) -> Result<Vec<ExportMetrics>, ReloadError> {
    CsvExporter::new(dir)
        .with_timeout(timeout)
        .export_all(store)
        .await
}

/// Verify the live tables; violations are an error.
pub async fn run_verify<S: ReloadStore>(
    store: &S,
    timeout: Duration,
) -> Result<VerifyReport, ReloadError> {
    verify_live(store, timeout).await?.into_result()
}
