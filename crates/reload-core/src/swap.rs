//! Double-buffer promotion state machine.

use crate::deadline::{bounded, Operation};
use crate::error::{Phase, ReloadError};
use crate::loader::{BatchLoader, LoadRow, DEFAULT_OPERATION_TIMEOUT};
use crate::schema::SchemaManager;
use crate::store::{ReloadStore, SwapPlan};
use crate::types::{Incarnation, LogicalTable};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Where a reload stands.
///
/// ```text
/// Empty ──build_live──► LiveBuilding ──build_shadow──► ShadowBuilding ──promote──► Promoted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapState {
    /// Nothing built yet by this run.
    Empty,
    /// Live tables exist, holding the previous dataset if there was one.
    LiveBuilding,
    /// Shadow tables exist and accept rows.
    ShadowBuilding,
    /// Shadow tables now carry the live names.
    Promoted,
}

impl SwapState {
    fn can_transition_to(self, next: SwapState) -> bool {
        matches!(
            (self, next),
            (SwapState::Empty, SwapState::LiveBuilding)
                | (SwapState::LiveBuilding, SwapState::ShadowBuilding)
                | (SwapState::ShadowBuilding, SwapState::Promoted)
        )
    }
}

/// Drives a reload through [`SwapState`] and performs the atomic promotion.
///
/// Loaders are only handed out for the shadow incarnation and only while
/// shadow tables are being built, so live tables are never written before
/// promotion.
pub struct SwapCoordinator<'a, S: ReloadStore> {
    store: &'a S,
    state: SwapState,
    plan: SwapPlan,
    timeout: Duration,
}

impl<'a, S: ReloadStore> SwapCoordinator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            state: SwapState::Empty,
            plan: SwapPlan::default(),
            timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Deadline for each store operation issued by the coordinator.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> SwapState {
        self.state
    }

    fn schema(&self) -> SchemaManager<'a, S> {
        SchemaManager::new(self.store).with_timeout(self.timeout)
    }

    fn ensure(&self, next: SwapState) -> Result<(), ReloadError> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(ReloadError::InvalidState {
                from: self.state,
                to: next,
            })
        }
    }

    /// Drop leftover shadow tables from an earlier run. Only valid before
    /// building; the live tables are not touched.
    pub async fn clear_shadow(&mut self) -> Result<(), ReloadError> {
        if self.state != SwapState::Empty {
            return Err(ReloadError::InvalidState {
                from: self.state,
                to: SwapState::Empty,
            });
        }
        self.schema().clear_shadow().await
    }

    /// `Empty → LiveBuilding`: create the live tables if they are absent.
    /// Live tables that already exist keep serving their rows.
    pub async fn build_live(&mut self) -> Result<(), ReloadError> {
        self.ensure(SwapState::LiveBuilding)?;
        self.schema().ensure_live().await?;
        self.state = SwapState::LiveBuilding;
        Ok(())
    }

    /// `LiveBuilding → ShadowBuilding`: create the shadow tables.
    pub async fn build_shadow(&mut self) -> Result<(), ReloadError> {
        self.ensure(SwapState::ShadowBuilding)?;
        self.schema().create_shadow().await?;
        self.state = SwapState::ShadowBuilding;
        Ok(())
    }

    /// A loader into the shadow table of `R`. Only available in `ShadowBuilding`.
    pub fn shadow_loader<R: LoadRow>(
        &self,
        threshold: usize,
    ) -> Result<BatchLoader<'a, S, R>, ReloadError> {
        if self.state != SwapState::ShadowBuilding {
            return Err(ReloadError::InvalidState {
                from: self.state,
                to: SwapState::ShadowBuilding,
            });
        }
        Ok(BatchLoader::new(self.store, Incarnation::Shadow, threshold).with_timeout(self.timeout))
    }

    /// `ShadowBuilding → Promoted`: drop the live tables and rename the
    /// shadow tables into their place as one atomic unit.
    ///
    /// Returns how long the promotion took.
    pub async fn promote(&mut self) -> Result<Duration, ReloadError> {
        self.ensure(SwapState::Promoted)?;
        info!("Renaming tables...");
        let started = Instant::now();

        let op = Operation {
            phase: Phase::Swap,
            table: Incarnation::Live.table_name(LogicalTable::Products),
            name: "promote",
        };
        bounded(self.timeout, op, self.store.promote(&self.plan), |e| {
            error!("Promotion failed on {}: {:#}", self.store.backend_name(), e);
            ReloadError::Swap { source: e.into() }
        })
        .await?;

        let elapsed = started.elapsed();
        self.state = SwapState::Promoted;
        info!("Renaming tables took {:.6} seconds", elapsed.as_secs_f64());
        Ok(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{FailPoint, MemoryStore};
    use crate::store::RowBatch;
    use crate::synth::RowSynthesizer;
    use crate::types::{Product, Substitution};
    use std::sync::Arc;

    async fn seed(store: &MemoryStore, incarnation: Incarnation, count: usize) {
        let mut synth = RowSynthesizer::new(count as u64);
        let products: Vec<Product> = (0..count).map(|_| synth.generate_product()).collect();
        let pool: Vec<_> = products.iter().map(|p| p.id).collect();
        let subs: Vec<Substitution> = pool
            .iter()
            .flat_map(|id| synth.generate_substitutions(*id, &pool))
            .collect();
        store
            .insert_rows(
                incarnation.table_name(LogicalTable::Products),
                RowBatch::Products(&products),
            )
            .await
            .unwrap();
        store
            .insert_rows(
                incarnation.table_name(LogicalTable::Substitutions),
                RowBatch::Substitutions(&subs),
            )
            .await
            .unwrap();
    }

    async fn ready_to_promote(store: &MemoryStore) -> SwapCoordinator<'_, MemoryStore> {
        let mut coordinator = SwapCoordinator::new(store);
        coordinator.clear_shadow().await.unwrap();
        coordinator.build_live().await.unwrap();
        coordinator.build_shadow().await.unwrap();
        coordinator
    }

    #[tokio::test]
    async fn test_full_state_sequence() {
        let store = MemoryStore::new();
        let mut coordinator = ready_to_promote(&store).await;
        assert_eq!(coordinator.state(), SwapState::ShadowBuilding);

        seed(&store, Incarnation::Shadow, 5).await;
        coordinator.promote().await.unwrap();

        assert_eq!(coordinator.state(), SwapState::Promoted);
        assert_eq!(store.table_names().await, vec!["products", "substitutions"]);
        assert_eq!(store.row_count("products").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_out_of_order_transitions_rejected() {
        let store = MemoryStore::new();
        let mut coordinator = SwapCoordinator::new(&store);

        assert!(matches!(
            coordinator.build_shadow().await,
            Err(ReloadError::InvalidState {
                from: SwapState::Empty,
                to: SwapState::ShadowBuilding
            })
        ));
        assert!(coordinator.promote().await.is_err());
        assert!(coordinator.shadow_loader::<Product>(10).is_err());

        coordinator.build_live().await.unwrap();
        assert!(coordinator.clear_shadow().await.is_err());
        assert!(coordinator.build_live().await.is_err());
        assert_eq!(store.table_names().await, vec!["products", "substitutions"]);
    }

    #[tokio::test]
    async fn test_promote_only_once() {
        let store = MemoryStore::new();
        let mut coordinator = ready_to_promote(&store).await;
        coordinator.promote().await.unwrap();
        assert!(matches!(
            coordinator.promote().await,
            Err(ReloadError::InvalidState {
                from: SwapState::Promoted,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_promotion_replaces_old_rows_and_keeps_foreign_keys() {
        let store = MemoryStore::new();
        let mut coordinator = ready_to_promote(&store).await;
        seed(&store, Incarnation::Live, 3).await;
        seed(&store, Incarnation::Shadow, 8).await;

        coordinator.promote().await.unwrap();
        assert_eq!(store.row_count("products").await.unwrap(), 8);

        // The promoted substitutions reference the promoted products table,
        // so dropping products directly must be refused.
        assert!(store.drop_table_if_exists("products").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_promotion_leaves_live_tables() {
        let store = MemoryStore::new();
        let mut coordinator = ready_to_promote(&store).await;
        seed(&store, Incarnation::Live, 3).await;
        seed(&store, Incarnation::Shadow, 8).await;
        store.fail_at(FailPoint::Promote).await;

        let err = coordinator.promote().await.unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert_eq!(coordinator.state(), SwapState::ShadowBuilding);
        assert_eq!(store.row_count("products").await.unwrap(), 3);
        assert_eq!(store.row_count("products_buffer").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_reader_never_sees_missing_or_mixed_tables() {
        let store = Arc::new(MemoryStore::new().with_promote_delay(Duration::from_millis(50)));
        {
            let mut coordinator = ready_to_promote(&store).await;
            seed(&store, Incarnation::Live, 3).await;
            seed(&store, Incarnation::Shadow, 8).await;

            let reader_store = Arc::clone(&store);
            let reader = tokio::spawn(async move {
                let mut observed = Vec::new();
                for _ in 0..200 {
                    let exists = reader_store.table_exists("products").await.unwrap()
                        && reader_store.table_exists("substitutions").await.unwrap();
                    let count = reader_store.row_count("products").await.unwrap();
                    observed.push((exists, count));
                    tokio::task::yield_now().await;
                }
                observed
            });

            tokio::time::sleep(Duration::from_millis(1)).await;
            coordinator.promote().await.unwrap();
            let observed = reader.await.unwrap();

            assert!(observed.iter().all(|(exists, _)| *exists));
            assert!(observed.iter().all(|(_, count)| *count == 3 || *count == 8));
        }
        assert_eq!(store.row_count("products").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_building_keeps_previous_live_rows() {
        let store = MemoryStore::new();
        SchemaManager::new(&store).create_live().await.unwrap();
        seed(&store, Incarnation::Live, 6).await;
        SchemaManager::new(&store).create_shadow().await.unwrap();
        seed(&store, Incarnation::Shadow, 2).await;

        let mut coordinator = ready_to_promote(&store).await;
        assert_eq!(store.row_count("products").await.unwrap(), 6);
        assert_eq!(store.row_count("products_buffer").await.unwrap(), 0);

        seed(&store, Incarnation::Shadow, 4).await;
        coordinator.promote().await.unwrap();
        assert_eq!(store.row_count("products").await.unwrap(), 4);
    }
}
