use std::borrow::Borrow;
use std::hash::Hash;
use std::time::Duration;

use ahash::AHashMap;

/// An item stamped with the clock reading it was stored at and its lifetime.
#[derive(Clone, Debug)]
pub(crate) struct Entry<T> {
    pub(crate) item: T,
    pub(crate) written_at: Duration,
    pub(crate) ttl: Duration,
}

impl<T> Entry<T> {
    pub(crate) fn new(item: T, written_at: Duration, ttl: Duration) -> Self {
        Entry {
            item,
            written_at,
            ttl,
        }
    }

    #[inline]
    pub(crate) fn is_expired(&self, now: Duration) -> bool {
        now.saturating_sub(self.written_at) >= self.ttl
    }
}

/// Densely packed entries plus an item → slot index.
///
/// Removal swaps the last slot into the hole, so positions are stable only
/// between removals.  That is what lets a cursor walk the slots and delete
/// behind itself without ever skipping an entry.
#[derive(Debug)]
pub(crate) struct Entries<T> {
    slots: Vec<Entry<T>>,
    index: AHashMap<T, usize>,
}

impl<T: Hash + Eq + Clone> Entries<T> {
    pub(crate) fn new() -> Self {
        Entries {
            slots: Vec::new(),
            index: AHashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn slot(&self, pos: usize) -> &Entry<T> {
        &self.slots[pos]
    }

    pub(crate) fn position<Q>(&self, item: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(item).copied()
    }

    /// Appends an entry for an item that is not yet stored.
    pub(crate) fn push(&mut self, entry: Entry<T>) {
        debug_assert!(!self.index.contains_key(&entry.item));
        self.index.insert(entry.item.clone(), self.slots.len());
        self.slots.push(entry);
    }

    /// Overwrites the entry at `pos`; the item must be the same.
    pub(crate) fn replace(&mut self, pos: usize, entry: Entry<T>) {
        debug_assert!(self.slots[pos].item == entry.item);
        self.slots[pos] = entry;
    }

    /// Removes the entry at `pos`, moving the last entry into its place.
    pub(crate) fn swap_remove(&mut self, pos: usize) -> Entry<T> {
        let removed = self.slots.swap_remove(pos);
        self.index.remove(&removed.item);
        if let Some(moved) = self.slots.get(pos) {
            if let Some(slot) = self.index.get_mut(&moved.item) {
                *slot = pos;
            }
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
    }
}
