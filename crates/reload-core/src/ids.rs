//! Time-ordered identifier generation.

use ulid::{Generator, Ulid};
use uuid::Uuid;

/// Produces unique identifiers whose byte order follows creation order.
///
/// Each id is a ULID (48-bit millisecond timestamp followed by 80 random bits)
/// stored as a UUID, so ordered primary-key indexes append instead of
/// splitting pages. Ids drawn from the same generator within one millisecond
/// increment the random part and stay strictly increasing.
pub struct IdGenerator {
    inner: Generator,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Generator::new(),
        }
    }

    /// Next identifier.
    pub fn next_id(&mut self) -> Uuid {
        // The monotonic generator only fails once 2^80 ids were drawn in one millisecond.
        let ulid = self.inner.generate().unwrap_or_else(|_| Ulid::new());
        Uuid::from_u128(ulid.0)
    }
}

/// Millisecond timestamp embedded in an id produced by [`IdGenerator`].
pub fn timestamp_ms(id: &Uuid) -> u64 {
    Ulid(id.as_u128()).timestamp_ms()
}
