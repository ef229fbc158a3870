//! Bounded batching of rows into bulk inserts.

use crate::deadline::{bounded, Operation};
use crate::error::{Phase, ReloadError};
use crate::store::{ReloadStore, RowBatch};
use crate::types::{Incarnation, LogicalTable, Product, Substitution};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::time::Duration;
use tracing::debug;

/// Default rows per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default deadline for a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// A row type the loader can bulk insert.
pub trait LoadRow: Send + Sync + Sized + 'static {
    const TABLE: LogicalTable;

    fn batch(rows: &[Self]) -> RowBatch<'_>;
}

impl LoadRow for Product {
    const TABLE: LogicalTable = LogicalTable::Products;

    fn batch(rows: &[Self]) -> RowBatch<'_> {
        RowBatch::Products(rows)
    }
}

impl LoadRow for Substitution {
    const TABLE: LogicalTable = LogicalTable::Substitutions;

    fn batch(rows: &[Self]) -> RowBatch<'_> {
        RowBatch::Substitutions(rows)
    }
}

/// Rows and batches landed by a loader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: u64,
    pub batches: u64,
}

/// Buffers rows and writes them in bulk inserts of at most `threshold` rows.
///
/// A full buffer is flushed immediately; [`BatchLoader::finish`] flushes the
/// remainder and waits for every in-flight insert. With `workers > 1` up to
/// that many inserts run concurrently. Any failed insert fails the load.
pub struct BatchLoader<'a, S: ReloadStore, R: LoadRow> {
    store: &'a S,
    table: &'static str,
    threshold: usize,
    workers: usize,
    timeout: Duration,
    buffer: Vec<R>,
    in_flight: FuturesUnordered<BoxFuture<'a, Result<u64, ReloadError>>>,
    batches_started: u64,
    stats: LoadStats,
}

impl<'a, S: ReloadStore, R: LoadRow> BatchLoader<'a, S, R> {
    /// Loader for `R`'s table in `incarnation`. A zero threshold is treated as 1.
    pub fn new(store: &'a S, incarnation: Incarnation, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            store,
            table: incarnation.table_name(R::TABLE),
            threshold,
            workers: 1,
            timeout: DEFAULT_OPERATION_TIMEOUT,
            buffer: Vec::with_capacity(threshold),
            in_flight: FuturesUnordered::new(),
            batches_started: 0,
            stats: LoadStats::default(),
        }
    }

    /// Allow up to `workers` concurrent inserts.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Deadline for each insert.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Buffer one row, flushing when the buffer is full.
    pub async fn push(&mut self, row: R) -> Result<(), ReloadError> {
        self.buffer.push(row);
        if self.buffer.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Buffer every row of `rows`.
    pub async fn extend<I>(&mut self, rows: I) -> Result<(), ReloadError>
    where
        I: IntoIterator<Item = R>,
    {
        for row in rows {
            self.push(row).await?;
        }
        Ok(())
    }

    /// Flush the partial buffer and wait for all inserts to land.
    pub async fn finish(mut self) -> Result<LoadStats, ReloadError> {
        self.flush().await?;
        while let Some(result) = self.in_flight.next().await {
            self.record(result?);
        }
        debug!(
            "Finished loading '{}': {} rows in {} batches",
            self.table, self.stats.rows, self.stats.batches
        );
        Ok(self.stats)
    }

    async fn flush(&mut self) -> Result<(), ReloadError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let rows = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.threshold));
        self.batches_started += 1;
        let batch = self.batches_started;
        let store = self.store;
        let table = self.table;
        let timeout = self.timeout;

        let insert = async move {
            let row_count = rows.len();
            let op = Operation {
                phase: Phase::Load,
                table,
                name: "bulk insert",
            };
            let inserted = bounded(
                timeout,
                op,
                store.insert_rows(table, R::batch(&rows)),
                |e| ReloadError::Load {
                    table: table.to_string(),
                    batch,
                    rows: row_count,
                    source: e.into(),
                },
            )
            .await?;
            debug!("Batch {} into '{}' complete: {} rows", batch, table, inserted);
            Ok(inserted)
        }
        .boxed();

        self.in_flight.push(insert);
        while self.in_flight.len() >= self.workers {
            match self.in_flight.next().await {
                Some(result) => self.record(result?),
                None => break,
            }
        }
        Ok(())
    }

    fn record(&mut self, inserted: u64) {
        self.stats.rows += inserted;
        self.stats.batches += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryStore};
    use crate::synth::RowSynthesizer;

    const THRESHOLD: usize = 10;

    async fn shadow_store() -> MemoryStore {
        let store = MemoryStore::new();
        for table in LogicalTable::CREATION_ORDER {
            store.create_table(Incarnation::Shadow, table).await.unwrap();
        }
        store
    }

    async fn load_products(store: &MemoryStore, count: usize, workers: usize) -> LoadStats {
        let mut synth = RowSynthesizer::new(42);
        let mut loader = BatchLoader::<_, Product>::new(store, Incarnation::Shadow, THRESHOLD)
            .with_workers(workers);
        for _ in 0..count {
            loader.push(synth.generate_product()).await.unwrap();
        }
        loader.finish().await.unwrap()
    }

    #[tokio::test]
    async fn test_batch_completeness_around_threshold() {
        for (count, expected_batches) in [
            (THRESHOLD - 1, 1),
            (THRESHOLD, 1),
            (THRESHOLD + 1, 2),
        ] {
            let store = shadow_store().await;
            let stats = load_products(&store, count, 1).await;

            assert_eq!(stats.rows, count as u64);
            assert_eq!(stats.batches, expected_batches);
            assert_eq!(store.row_count("products_buffer").await.unwrap(), count as u64);
            assert_eq!(store.insert_calls("products_buffer").await, expected_batches);
        }
    }

    #[tokio::test]
    async fn test_no_rows_no_insert() {
        let store = shadow_store().await;
        let stats = load_products(&store, 0, 1).await;
        assert_eq!(stats, LoadStats::default());
        assert_eq!(store.insert_calls("products_buffer").await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_workers_land_every_row() {
        let store = shadow_store().await;
        let stats = load_products(&store, 95, 4).await;
        assert_eq!(stats.rows, 95);
        assert_eq!(stats.batches, 10);
        assert_eq!(store.row_count("products_buffer").await.unwrap(), 95);
    }

    #[tokio::test]
    async fn test_failed_batch_is_fatal() {
        let store = shadow_store().await;
        store
            .fail_at(FailPoint::Insert {
                table: "products_buffer".into(),
                after_batches: 1,
            })
            .await;

        let mut synth = RowSynthesizer::new(42);
        let mut loader = BatchLoader::<_, Product>::new(&store, Incarnation::Shadow, THRESHOLD);
        let mut result = Ok(());
        for _ in 0..(THRESHOLD * 3) {
            result = loader.push(synth.generate_product()).await;
            if result.is_err() {
                break;
            }
        }

        match result {
            Err(ReloadError::Load { table, batch, rows, .. }) => {
                assert_eq!(table, "products_buffer");
                assert_eq!(batch, 2);
                assert_eq!(rows, THRESHOLD);
            }
            other => panic!("expected load error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_in_final_flush_is_reported() {
        let store = shadow_store().await;
        store
            .fail_at(FailPoint::Insert {
                table: "products_buffer".into(),
                after_batches: 0,
            })
            .await;

        let mut synth = RowSynthesizer::new(1);
        let mut loader = BatchLoader::<_, Product>::new(&store, Incarnation::Shadow, THRESHOLD);
        loader.push(synth.generate_product()).await.unwrap();
        assert!(matches!(
            loader.finish().await,
            Err(ReloadError::Load { batch: 1, rows: 1, .. })
        ));
    }
}
