//! The reload run: clear buffers, build, load, promote.

use crate::error::ReloadError;
use crate::loader::{LoadStats, DEFAULT_BATCH_SIZE, DEFAULT_OPERATION_TIMEOUT};
use crate::store::ReloadStore;
use crate::swap::SwapCoordinator;
use crate::synth::{RowSynthesizer, DEFAULT_NAME_LENGTH, DEFAULT_WINDOW_SIZE, MAX_NAME_LENGTH};
use crate::types::{Product, Substitution};
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Default number of products per run (100 outer batches of 1000).
pub const DEFAULT_PRODUCT_COUNT: u64 = 100_000;

/// Largest accepted product count. Every product id is held in memory as the
/// substitution candidate pool.
pub const MAX_PRODUCT_COUNT: u64 = 100_000_000;

/// Parameters of one reload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Products to generate.
    pub product_count: u64,
    /// Rows per bulk insert into `products_buffer`.
    pub product_batch_size: usize,
    /// Rows per bulk insert into `substitutions_buffer`.
    pub substitution_batch_size: usize,
    /// Candidates considered per product.
    pub window_size: usize,
    /// Generated product name length.
    pub name_length: usize,
    /// Seed for names and candidate windows; drawn from entropy when `None`.
    pub seed: Option<u64>,
    /// Concurrent bulk inserts per table.
    pub workers: usize,
    /// Deadline for each database operation.
    pub operation_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            product_count: DEFAULT_PRODUCT_COUNT,
            product_batch_size: DEFAULT_BATCH_SIZE,
            substitution_batch_size: DEFAULT_BATCH_SIZE,
            window_size: DEFAULT_WINDOW_SIZE,
            name_length: DEFAULT_NAME_LENGTH,
            seed: None,
            workers: 1,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ReloadError> {
        if self.product_count > MAX_PRODUCT_COUNT || usize::try_from(self.product_count).is_err() {
            return Err(ReloadError::Config(format!(
                "product count must be at most {MAX_PRODUCT_COUNT}"
            )));
        }
        if self.product_batch_size == 0 || self.substitution_batch_size == 0 {
            return Err(ReloadError::Config("batch sizes must be at least 1".into()));
        }
        if self.window_size == 0 {
            return Err(ReloadError::Config("window size must be at least 1".into()));
        }
        if self.name_length == 0 || self.name_length > MAX_NAME_LENGTH {
            return Err(ReloadError::Config(format!(
                "name length must be between 1 and {MAX_NAME_LENGTH}"
            )));
        }
        if self.workers == 0 {
            return Err(ReloadError::Config("workers must be at least 1".into()));
        }
        if self.operation_timeout.is_zero() {
            return Err(ReloadError::Config("operation timeout must be positive".into()));
        }
        Ok(())
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub products: LoadStats,
    pub substitutions: LoadStats,
    /// Time spent generating and inserting rows.
    pub load_duration: Duration,
    /// Time the atomic promotion took.
    pub promote_duration: Duration,
    pub total_duration: Duration,
}

impl RunSummary {
    /// Rows landed per second of load time.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.load_duration.as_secs_f64();
        if secs > 0.0 {
            (self.products.rows + self.substitutions.rows) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Regenerate the dataset into the shadow tables and promote it.
///
/// Products are fully loaded before any substitution is inserted, and every
/// shadow write has landed before promotion begins. Any failure aborts the
/// run; failures before promotion leave the live tables and their rows
/// untouched, so readers keep seeing the previous dataset until the swap.
pub async fn run_pipeline<S: ReloadStore>(
    store: &S,
    config: &PipelineConfig,
) -> Result<RunSummary, ReloadError> {
    config.validate()?;
    let started = Instant::now();
    info!(
        "Reloading {} products on {} (window {}, batches {}/{}, workers {})",
        config.product_count,
        store.backend_name(),
        config.window_size,
        config.product_batch_size,
        config.substitution_batch_size,
        config.workers
    );

    let mut coordinator = SwapCoordinator::new(store).with_timeout(config.operation_timeout);
    coordinator.clear_shadow().await?;
    coordinator.build_live().await?;
    coordinator.build_shadow().await?;

    let load_started = Instant::now();
    let seed = config.seed.unwrap_or_else(rand::random);
    info!("Generating with seed {}", seed);
    let mut synth = RowSynthesizer::new(seed)
        .with_name_length(config.name_length)
        .with_window_size(config.window_size);

    info!("importing data...");
    let mut pool: Vec<Uuid> = Vec::new();
    let mut products = coordinator
        .shadow_loader::<Product>(config.product_batch_size)?
        .with_workers(config.workers);
    for _ in 0..config.product_count {
        let product = synth.generate_product();
        pool.push(product.id);
        products.push(product).await?;
    }
    let product_stats = products.finish().await?;
    info!(
        "Loaded {} products in {} batches",
        product_stats.rows, product_stats.batches
    );

    info!("Importing subs...");
    let mut substitutions = coordinator
        .shadow_loader::<Substitution>(config.substitution_batch_size)?
        .with_workers(config.workers);
    for product_id in &pool {
        let generated = synth.generate_substitutions(*product_id, &pool);
        substitutions.extend(generated).await?;
    }
    let substitution_stats = substitutions.finish().await?;
    info!(
        "Loaded {} substitutions in {} batches",
        substitution_stats.rows, substitution_stats.batches
    );
    let load_duration = load_started.elapsed();

    let promote_duration = coordinator.promote().await?;

    let summary = RunSummary {
        products: product_stats,
        substitutions: substitution_stats,
        load_duration,
        promote_duration,
        total_duration: started.elapsed(),
    };
    info!(
        "Reload complete in {:?} ({:.2} rows/sec)",
        summary.total_duration,
        summary.rows_per_second()
    );
    Ok(summary)
}
