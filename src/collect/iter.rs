//! Iterator that yields live entries and deletes expired ones as it passes.
//!
//! ## State machine
//!
//! | State      | Meaning                                         |
//! |------------|-------------------------------------------------|
//! | `NotReady` | nothing buffered; the next query scans forward  |
//! | `Ready`    | a live entry is buffered at `buffered`          |
//! | `Done`     | the backing entries are exhausted               |
//! | `Failed`   | a scan is in progress (or panicked part-way)    |
//!
//! `has_next` moves `NotReady` to `Ready` or `Done`, deleting every expired
//! entry it steps over.  `next` hands out the buffered entry and drops back
//! to `NotReady`.
//!
//! ## Cursor invariant
//!
//! Slots `[0, cursor)` have been visited; slots `[cursor, len)` have not.
//! Deleting slot `p` moves the last slot (unvisited, or `p` itself) into
//! `p`, so after any deletion at `p` the cursor is put back to `p` and the
//! moved entry is examined next.

use std::hash::Hash;

use crate::clock::Clock;
use crate::collect::entries::Entries;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    NotReady,
    Ready,
    Done,
    Failed,
}

/// Iterator over the live items of an [`ExpiringSet`](crate::ExpiringSet).
///
/// Created by [`ExpiringSet::iter`](crate::ExpiringSet::iter).  Holds the set
/// mutably borrowed, so the set cannot be changed behind its back.
pub struct ExpiringIter<'a, T> {
    entries: &'a mut Entries<T>,
    clock: &'a dyn Clock,
    cursor: usize,
    state: State,
    buffered: usize,
    /// Slot of the entry most recently returned by `next`.
    last: Option<usize>,
}

impl<'a, T: Hash + Eq + Clone> ExpiringIter<'a, T> {
    pub(crate) fn new(entries: &'a mut Entries<T>, clock: &'a dyn Clock) -> Self {
        ExpiringIter {
            entries,
            clock,
            cursor: 0,
            state: State::NotReady,
            buffered: 0,
            last: None,
        }
    }

    /// Returns `true` if another live item remains, evicting expired entries
    /// on the way to it.
    ///
    /// # Panics
    /// If a previous scan on this iterator was interrupted by a panic.
    pub fn has_next(&mut self) -> bool {
        assert!(
            self.state != State::Failed,
            "expiring iterator used after an interrupted scan"
        );
        match self.state {
            State::Done => false,
            State::Ready => true,
            _ => {
                self.state = State::Failed;
                match self.next_unexpired() {
                    Some(pos) => {
                        self.buffered = pos;
                        self.state = State::Ready;
                        true
                    }
                    None => {
                        self.state = State::Done;
                        false
                    }
                }
            }
        }
    }

    /// Removes the item most recently returned by `next`, whatever its
    /// expiration state, and returns it.
    ///
    /// Fails with [`Error::NoCurrentElement`] if `next` has not returned an
    /// item since the last removal.
    pub fn remove(&mut self) -> Result<T> {
        let pos = self.last.take().ok_or(Error::NoCurrentElement)?;
        let removed = self.entries.swap_remove(pos);
        // Whatever was buffered sits at `pos + 1` or was moved into `pos`;
        // rescanning from `pos` covers both.
        self.cursor = pos;
        if self.state != State::Failed {
            self.state = State::NotReady;
        }
        Ok(removed.item)
    }

    /// Next live slot at or after the cursor, deleting expired slots.
    fn next_unexpired(&mut self) -> Option<usize> {
        while self.cursor < self.entries.len() {
            let now = self.clock.elapsed();
            if !self.entries.slot(self.cursor).is_expired(now) {
                let pos = self.cursor;
                self.cursor += 1;
                return Some(pos);
            }
            self.entries.swap_remove(self.cursor);
        }
        None
    }
}

impl<T: Hash + Eq + Clone> Iterator for ExpiringIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if !self.has_next() {
            return None;
        }
        self.state = State::NotReady;
        self.last = Some(self.buffered);
        Some(self.entries.slot(self.buffered).item.clone())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            State::Done => (0, Some(0)),
            State::Ready => (1, Some(self.entries.len() - self.cursor + 1)),
            _ => (0, Some(self.entries.len().saturating_sub(self.cursor))),
        }
    }
}
