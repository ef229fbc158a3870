//! Invariant checks over a loaded dataset.

use crate::deadline::{bounded, Operation};
use crate::error::{Phase, ReloadError};
use crate::store::ReloadStore;
use crate::types::{Incarnation, LogicalTable, Product, Substitution};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of verifying a products/substitutions table set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub products: usize,
    pub substitutions: usize,
    /// Substitutions whose `product_id` or `swapped_product_id` is not a product.
    pub dangling_references: Vec<Uuid>,
    /// Substitutions pointing a product at itself.
    pub self_substitutions: Vec<Uuid>,
    /// Products whose ranks are not exactly `1..=k`.
    pub rank_violations: Vec<Uuid>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_references.is_empty()
            && self.self_substitutions.is_empty()
            && self.rank_violations.is_empty()
    }

    /// `Ok(self)` when clean, otherwise a [`ReloadError::Verify`] summary.
    pub fn into_result(self) -> Result<Self, ReloadError> {
        if self.is_clean() {
            return Ok(self);
        }
        Err(ReloadError::Verify(format!(
            "{} dangling references, {} self-substitutions, {} products with non-contiguous ranks",
            self.dangling_references.len(),
            self.self_substitutions.len(),
            self.rank_violations.len()
        )))
    }
}

/// Check referential integrity, self-exclusion and dense ranks.
pub fn verify_dataset(products: &[Product], substitutions: &[Substitution]) -> VerifyReport {
    let ids: HashSet<Uuid> = products.iter().map(|p| p.id).collect();
    let mut report = VerifyReport {
        products: products.len(),
        substitutions: substitutions.len(),
        ..VerifyReport::default()
    };
    let mut ranks: BTreeMap<Uuid, Vec<i32>> = BTreeMap::new();

    for sub in substitutions {
        if !ids.contains(&sub.product_id) || !ids.contains(&sub.swapped_product_id) {
            report.dangling_references.push(sub.id);
        }
        if sub.product_id == sub.swapped_product_id {
            report.self_substitutions.push(sub.id);
        }
        ranks.entry(sub.product_id).or_default().push(sub.rank);
    }

    for (product_id, mut product_ranks) in ranks {
        product_ranks.sort_unstable();
        let dense = product_ranks
            .iter()
            .enumerate()
            .all(|(i, rank)| *rank == i as i32 + 1);
        if !dense {
            report.rank_violations.push(product_id);
        }
    }

    report
}

/// Read the live tables and verify them.
pub async fn verify_live<S: ReloadStore>(
    store: &S,
    timeout: Duration,
) -> Result<VerifyReport, ReloadError> {
    let products_table = Incarnation::Live.table_name(LogicalTable::Products);
    let substitutions_table = Incarnation::Live.table_name(LogicalTable::Substitutions);

    let products = bounded(
        timeout,
        Operation {
            phase: Phase::Verify,
            table: products_table,
            name: "read",
        },
        store.fetch_products(products_table),
        |e| ReloadError::Verify(format!("reading {products_table}: {e:#}")),
    )
    .await?;
    let substitutions = bounded(
        timeout,
        Operation {
            phase: Phase::Verify,
            table: substitutions_table,
            name: "read",
        },
        store.fetch_substitutions(substitutions_table),
        |e| ReloadError::Verify(format!("reading {substitutions_table}: {e:#}")),
    )
    .await?;

    let report = verify_dataset(&products, &substitutions);
    if report.is_clean() {
        info!(
            "Verified {} products and {} substitutions",
            report.products, report.substitutions
        );
    } else {
        warn!("Verification found violations: {:?}", report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "x".into(),
        }
    }

    fn sub(product_id: Uuid, swapped_product_id: Uuid, rank: i32) -> Substitution {
        Substitution {
            id: Uuid::new_v4(),
            product_id,
            swapped_product_id,
            rank,
        }
    }

    #[test]
    fn test_clean_dataset() {
        let (a, b, c) = (product(), product(), product());
        let subs = vec![sub(a.id, b.id, 1), sub(a.id, c.id, 2), sub(b.id, c.id, 1)];
        let report = verify_dataset(&[a, b, c], &subs);
        assert!(report.is_clean());
        assert_eq!(report.substitutions, 3);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_detects_violations() {
        let (a, b) = (product(), product());
        let subs = vec![
            sub(a.id, a.id, 1),
            sub(a.id, b.id, 3),
            sub(b.id, Uuid::new_v4(), 1),
        ];
        let report = verify_dataset(&[a.clone(), b], &subs);
        assert_eq!(report.self_substitutions, vec![subs[0].id]);
        assert_eq!(report.dangling_references, vec![subs[2].id]);
        assert_eq!(report.rank_violations, vec![a.id]);
        assert!(matches!(report.into_result(), Err(ReloadError::Verify(_))));
    }

    #[test]
    fn test_duplicate_rank_is_violation() {
        let (a, b, c) = (product(), product(), product());
        let subs = vec![sub(a.id, b.id, 1), sub(a.id, c.id, 1)];
        let report = verify_dataset(&[a.clone(), b, c], &subs);
        assert_eq!(report.rank_violations, vec![a.id]);
    }

    #[test]
    fn test_empty_dataset_is_clean() {
        assert!(verify_dataset(&[], &[]).is_clean());
    }
}
