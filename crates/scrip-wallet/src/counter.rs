//! Derivation counter source
//!
//! Deterministic outputs consume one derivation index each. Indexes are
//! reserved in contiguous ranges and never reused within a seed, so an
//! interrupted operation leaves a gap instead of a reusable index. The gap is
//! harmless; reuse would produce duplicate secrets.

use std::collections::HashMap;

use async_trait::async_trait;
use scrip::nuts::Id;
use tokio::sync::Mutex;

use crate::error::Error;

/// A reserved contiguous range of derivation indexes `[start, start + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    /// First reserved index
    pub start: u32,
    /// Number of reserved indexes
    pub count: u32,
}

impl Range {
    /// Iterate over the indexes of the range
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..self.start + self.count
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Source of monotonic per-keyset derivation counters
///
/// Reservations on the same keyset are serialized and never overlap;
/// different keysets are independent.
#[async_trait]
pub trait CounterSource: Send + Sync + std::fmt::Debug {
    /// Atomically reserve `count` contiguous indexes on `keyset_id`
    ///
    /// `count == 0` reserves nothing and does not advance the counter.
    async fn reserve(&self, keyset_id: Id, count: u32) -> Result<Range, Error>;

    /// Raise the counter to at least `min_next`
    ///
    /// Idempotent; a lower value never rewinds the counter.
    async fn advance_to_at_least(&self, keyset_id: Id, min_next: u32) -> Result<(), Error>;

    /// Hard-set the counter
    ///
    /// Used by restore to resume at the first unseen index.
    async fn set_next(&self, keyset_id: Id, next: u32) -> Result<(), Error>;

    /// Current `next` per keyset
    async fn snapshot(&self) -> Result<HashMap<Id, u32>, Error>;
}

/// In-memory [`CounterSource`]
///
/// Reference implementation; a persistent wallet provides its own backed by
/// storage.
#[derive(Debug, Default)]
pub struct MemoryCounterSource {
    counters: Mutex<HashMap<Id, u32>>,
}

impl MemoryCounterSource {
    /// Create new empty [`MemoryCounterSource`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create [`MemoryCounterSource`] from a previous [`CounterSource::snapshot`]
    pub fn from_snapshot(snapshot: HashMap<Id, u32>) -> Self {
        Self {
            counters: Mutex::new(snapshot),
        }
    }
}

#[async_trait]
impl CounterSource for MemoryCounterSource {
    async fn reserve(&self, keyset_id: Id, count: u32) -> Result<Range, Error> {
        let mut counters = self.counters.lock().await;
        let next = counters.entry(keyset_id).or_insert(0);

        let start = *next;
        *next = next
            .checked_add(count)
            .ok_or_else(|| Error::Custom("Derivation counter overflow".to_string()))?;

        Ok(Range { start, count })
    }

    async fn advance_to_at_least(&self, keyset_id: Id, min_next: u32) -> Result<(), Error> {
        let mut counters = self.counters.lock().await;
        let next = counters.entry(keyset_id).or_insert(0);

        if *next < min_next {
            *next = min_next;
        }

        Ok(())
    }

    async fn set_next(&self, keyset_id: Id, next: u32) -> Result<(), Error> {
        let mut counters = self.counters.lock().await;
        counters.insert(keyset_id, next);

        Ok(())
    }

    async fn snapshot(&self) -> Result<HashMap<Id, u32>, Error> {
        Ok(self.counters.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use super::*;

    fn keyset_id() -> Id {
        Id::from_str("009a1f293253e41e").unwrap()
    }

    #[tokio::test]
    async fn test_reserve_is_contiguous() {
        let source = MemoryCounterSource::new();

        let a = source.reserve(keyset_id(), 3).await.unwrap();
        let b = source.reserve(keyset_id(), 2).await.unwrap();

        assert_eq!(a, Range { start: 0, count: 3 });
        assert_eq!(b, Range { start: 3, count: 2 });
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_zero_reserve_does_not_advance() {
        let source = MemoryCounterSource::new();

        source.reserve(keyset_id(), 4).await.unwrap();
        let empty = source.reserve(keyset_id(), 0).await.unwrap();

        assert_eq!(empty, Range { start: 4, count: 0 });
        assert!(empty.is_empty());
        assert_eq!(
            source.snapshot().await.unwrap().get(&keyset_id()),
            Some(&4)
        );
    }

    #[tokio::test]
    async fn test_advance_and_set() {
        let source = MemoryCounterSource::new();

        source.advance_to_at_least(keyset_id(), 10).await.unwrap();
        // A lower value does not rewind
        source.advance_to_at_least(keyset_id(), 5).await.unwrap();
        assert_eq!(
            source.snapshot().await.unwrap().get(&keyset_id()),
            Some(&10)
        );

        source.set_next(keyset_id(), 2).await.unwrap();
        assert_eq!(source.snapshot().await.unwrap().get(&keyset_id()), Some(&2));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_are_disjoint() {
        let source = Arc::new(MemoryCounterSource::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                source.reserve(keyset_id(), 5).await.unwrap()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            let range = handle.await.unwrap();
            assert_eq!(range.count, 5);
            starts.push(range.start);
        }

        starts.sort_unstable();
        // Ranges tile a contiguous prefix
        assert_eq!(starts, (0..8).map(|i| i * 5).collect::<Vec<_>>());
        assert_eq!(
            source.snapshot().await.unwrap().get(&keyset_id()),
            Some(&40)
        );
    }

    #[tokio::test]
    async fn test_keysets_are_independent() {
        let source = MemoryCounterSource::new();
        let other = Id::from_str("00456a94ab4e1c46").unwrap();

        source.reserve(keyset_id(), 3).await.unwrap();
        let range = source.reserve(other, 1).await.unwrap();

        assert_eq!(range.start, 0);
    }
}
