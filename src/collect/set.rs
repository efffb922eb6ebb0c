use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{default_clock, Clock};
use crate::collect::entries::{Entries, Entry};
use crate::collect::iter::ExpiringIter;
use crate::error::{Error, Result};

/// When an item's lifetime starts counting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// From the first add.  Re-adding a live item changes nothing.
    AfterCreation,
    /// From the latest add.  Re-adding a live item restarts its timer.
    AfterReadd,
}

/// A set whose items disappear once their lifetime has elapsed.
///
/// Every item carries its own lifetime, given per call to
/// [`add_with_expiry`](ExpiringSet::add_with_expiry) or taken from the
/// set's default.  Expired items are invisible immediately but are only
/// deleted when a lookup or traversal reaches them; [`len`](ExpiringSet::len)
/// walks the whole set for that reason.
///
/// Not synchronized: all access goes through `&mut self`, so sharing between
/// threads needs an outer lock.
///
/// # Example
/// ```
/// use lapse::clock::ManualClock;
/// use lapse::{ExpiringSet, Mode};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = Arc::new(ManualClock::new());
/// let mut seen = ExpiringSet::<&str>::builder(Mode::AfterCreation)
///     .default_expiry(Duration::from_secs(5))
///     .clock(clock.clone())
///     .build()
///     .unwrap();
///
/// assert_eq!(seen.add("msg-1"), Ok(true));
/// assert_eq!(seen.add("msg-1"), Ok(false));
/// clock.advance(Duration::from_secs(5));
/// assert!(!seen.contains(&"msg-1"));
/// ```
pub struct ExpiringSet<T> {
    entries: Entries<T>,
    mode: Mode,
    default_expiry: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl<T: Hash + Eq + Clone> ExpiringSet<T> {
    /// An empty set with no default expiry, reading a monotonic clock.
    ///
    /// Items must be added with [`add_with_expiry`](ExpiringSet::add_with_expiry).
    pub fn new(mode: Mode) -> Self {
        ExpiringSet {
            entries: Entries::new(),
            mode,
            default_expiry: None,
            clock: default_clock(),
        }
    }

    pub fn builder(mode: Mode) -> ExpiringSetBuilder {
        ExpiringSetBuilder::new(mode)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn default_expiry(&self) -> Option<Duration> {
        self.default_expiry
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Adds `item` with the set's default lifetime.
    ///
    /// Fails with [`Error::NoDefaultExpiry`] when the set was built without
    /// one.
    pub fn add(&mut self, item: T) -> Result<bool> {
        let ttl = self.default_expiry.ok_or(Error::NoDefaultExpiry)?;
        self.add_with_expiry(item, ttl)
    }

    /// Adds `item` to live for `ttl`.
    ///
    /// Returns `true` if `item` was not a live member.  For a live member this
    /// returns `false`; under [`Mode::AfterReadd`] the member's timer (and
    /// lifetime) are nevertheless replaced by the new ones.  An expired entry
    /// still occupying storage counts as absent and is replaced.
    pub fn add_with_expiry(&mut self, item: T, ttl: Duration) -> Result<bool> {
        if ttl.is_zero() {
            return Err(Error::InvalidExpiry);
        }
        let now = self.clock.elapsed();
        let Some(pos) = self.entries.position(&item) else {
            self.entries.push(Entry::new(item, now, ttl));
            return Ok(true);
        };

        if self.entries.slot(pos).is_expired(now) {
            self.entries.replace(pos, Entry::new(item, now, ttl));
            return Ok(true);
        }
        if self.mode == Mode::AfterReadd {
            self.entries.replace(pos, Entry::new(item, now, ttl));
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns `true` if `item` is a live member, deleting it if it has
    /// expired.
    pub fn contains<Q>(&mut self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(pos) = self.entries.position(item) else {
            return false;
        };
        if self.entries.slot(pos).is_expired(self.clock.elapsed()) {
            self.entries.swap_remove(pos);
            return false;
        }
        true
    }

    /// Iterates the live items, deleting expired ones along the way.
    pub fn iter(&mut self) -> ExpiringIter<'_, T> {
        ExpiringIter::new(&mut self.entries, &*self.clock)
    }

    /// Number of live items.  Walks (and sweeps) the whole set.
    pub fn len(&mut self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&mut self) -> bool {
        !self.iter().has_next()
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    /// Removes `item` regardless of its timer.  Returns whether it was stored.
    pub fn remove<Q>(&mut self, item: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.entries.position(item) {
            Some(pos) => {
                self.entries.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Keeps only the live items for which `keep` returns `true`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        let mut it = self.iter();
        while let Some(item) = it.next() {
            if !keep(&item) {
                let removed = it.remove();
                debug_assert!(
                    matches!(&removed, Ok(r) if *r == item),
                    "retain removed something other than the item it rejected"
                );
            }
        }
    }

    /// Deletes every expired entry now; returns how many live items remain.
    pub fn clean_up(&mut self) -> usize {
        self.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a, T: Hash + Eq + Clone> IntoIterator for &'a mut ExpiringSet<T> {
    type Item = T;
    type IntoIter = ExpiringIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for ExpiringSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiringSet")
            .field("mode", &self.mode)
            .field("default_expiry", &self.default_expiry)
            .field("stored", &self.entries)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for an [`ExpiringSet`].
pub struct ExpiringSetBuilder {
    mode: Mode,
    default_expiry: Option<Duration>,
    clock: Option<Arc<dyn Clock>>,
}

impl ExpiringSetBuilder {
    pub fn new(mode: Mode) -> Self {
        ExpiringSetBuilder {
            mode,
            default_expiry: None,
            clock: None,
        }
    }

    /// Lifetime used by [`ExpiringSet::add`].
    pub fn default_expiry(mut self, ttl: Duration) -> Self {
        self.default_expiry = Some(ttl);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fails with [`Error::InvalidExpiry`] for a zero default expiry.
    pub fn build<T: Hash + Eq + Clone>(self) -> Result<ExpiringSet<T>> {
        if self.default_expiry.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidExpiry);
        }
        Ok(ExpiringSet {
            entries: Entries::new(),
            mode: self.mode,
            default_expiry: self.default_expiry,
            clock: self.clock.unwrap_or_else(default_clock),
        })
    }
}
