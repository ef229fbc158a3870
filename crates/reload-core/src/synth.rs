//! Synthetic product and substitution rows.

use crate::ids::IdGenerator;
use crate::types::{Product, Substitution};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Default number of candidates considered per product.
pub const DEFAULT_WINDOW_SIZE: usize = 3;

/// Default product name length.
pub const DEFAULT_NAME_LENGTH: usize = 100;

/// Longest name the `name` column accepts.
pub const MAX_NAME_LENGTH: usize = 255;

const NAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Produces product rows and their ranked substitutions.
///
/// Names and candidate windows come from a seeded RNG, so the same seed yields
/// the same shape of dataset. Ids come from an [`IdGenerator`] and are
/// time-based regardless of the seed.
pub struct RowSynthesizer {
    rng: StdRng,
    ids: IdGenerator,
    name_length: usize,
    window_size: usize,
}

impl RowSynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ids: IdGenerator::new(),
            name_length: DEFAULT_NAME_LENGTH,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    /// Set the generated name length (clamped to `1..=MAX_NAME_LENGTH`).
    pub fn with_name_length(mut self, name_length: usize) -> Self {
        self.name_length = name_length.clamp(1, MAX_NAME_LENGTH);
        self
    }

    /// Set how many contiguous candidates each product draws from the pool.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Generate one product with a random letters-only name.
    pub fn generate_product(&mut self) -> Product {
        let name: String = (0..self.name_length)
            .map(|_| NAME_ALPHABET[self.rng.gen_range(0..NAME_ALPHABET.len())] as char)
            .collect();
        Product {
            id: self.ids.next_id(),
            name,
        }
    }

    /// Generate the ranked substitutions of `product_id` from `pool`.
    ///
    /// A window of `window_size` consecutive candidates is taken at a uniform
    /// offset, clamped so it never runs past the end of the pool. The product
    /// itself is skipped; the survivors are ranked `1..=k` in window order.
    /// Pools shorter than the window produce fewer substitutions.
    pub fn generate_substitutions(&mut self, product_id: Uuid, pool: &[Uuid]) -> Vec<Substitution> {
        let max_start = pool.len().saturating_sub(self.window_size);
        let start = self.rng.gen_range(0..=max_start);
        let end = (start + self.window_size).min(pool.len());

        pool[start..end]
            .iter()
            .filter(|candidate| **candidate != product_id)
            .enumerate()
            .map(|(position, candidate)| Substitution {
                id: self.ids.next_id(),
                product_id,
                swapped_product_id: *candidate,
                rank: position as i32 + 1,
            })
            .collect()
    }
}
