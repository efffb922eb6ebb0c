//! An unordered bag of items with multiplicities.

use std::fmt;
use std::hash::Hash;

use ahash::AHashMap;

/// An immutable multiset: each distinct item appears with a count >= 1.
///
/// Produced by [`WindowedCounter::snapshot`](crate::WindowedCounter::snapshot),
/// where an item's multiplicity is its counter value in the current window.
#[derive(Clone, PartialEq, Eq)]
pub struct Multiset<T: Hash + Eq> {
    counts: AHashMap<T, u64>,
    total: u64,
}

impl<T: Hash + Eq> Multiset<T> {
    pub fn new() -> Self {
        Multiset {
            counts: AHashMap::new(),
            total: 0,
        }
    }

    /// Adds `copies` occurrences of `item`.  Adding zero copies is a no-op.
    pub(crate) fn add_copies(&mut self, item: T, copies: u64) {
        if copies == 0 {
            return;
        }
        *self.counts.entry(item).or_insert(0) += copies;
        self.total += copies;
    }

    /// Number of occurrences of `item` (0 if absent).
    pub fn count(&self, item: &T) -> u64 {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.counts.contains_key(item)
    }

    /// Total number of occurrences, counting duplicates.
    pub fn len(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of distinct items.
    pub fn distinct_len(&self) -> usize {
        self.counts.len()
    }

    /// Iterates `(item, count)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, u64)> {
        self.counts.iter().map(|(item, n)| (item, *n))
    }
}

impl<T: Hash + Eq> Default for Multiset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq + fmt::Debug> fmt::Debug for Multiset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.counts.iter()).finish()
    }
}

impl<T: Hash + Eq> FromIterator<(T, u64)> for Multiset<T> {
    fn from_iter<I: IntoIterator<Item = (T, u64)>>(iter: I) -> Self {
        let mut set = Multiset::new();
        for (item, copies) in iter {
            set.add_copies(item, copies);
        }
        set
    }
}
