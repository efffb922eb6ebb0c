//! Per-item counters bucketed into fixed-width time windows.
//!
//! Elapsed time is cut into half-open windows of `window_size`; window `n`
//! covers `[n * window_size, (n + 1) * window_size)`.  Every counter
//! operation addresses the `(current window, item)` pair, so a count written
//! in one window is invisible from the next.  Old windows are reclaimed by the
//! underlying [`ExpiringCache`], whose TTL is
//! `window_size * expiration_multiplier` measured from each counter's
//! creation.
//!
//! # Example
//! ```
//! use lapse::clock::ManualClock;
//! use lapse::WindowedCounter;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(ManualClock::new());
//! let hits: WindowedCounter<&str> = WindowedCounter::builder(Duration::from_secs(5))
//!     .clock(clock.clone())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(hits.increment(&"/login"), 1);
//! assert_eq!(hits.increment(&"/login"), 2);
//!
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(hits.get(&"/login"), 0);
//! ```

use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::builder::{validate_shards, CacheBuilder, DEFAULT_SHARDS};
use crate::cache::ExpiringCache;
use crate::clock::{default_clock, Clock};
use crate::error::{Error, Result};
use crate::metrics::stats::Metrics;
use crate::multiset::Multiset;

/// Default number of window-widths a counter survives in the cache.
pub const DEFAULT_EXPIRATION_MULTIPLIER: u32 = 2;

/// Cache key: an item within one specific window.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WindowKey<T> {
    pub window: u64,
    pub item: T,
}

impl<T> WindowKey<T> {
    pub fn new(window: u64, item: T) -> Self {
        WindowKey { window, item }
    }
}

// ---------------------------------------------------------------------------
// WindowedCounter
// ---------------------------------------------------------------------------

/// Atomic, self-cleaning per-item counters scoped to the current time window.
///
/// All arithmetic is safe to call from many threads at once; concurrent
/// increments of one item in one window are never lost.  An update lands in
/// whichever window is current at the moment of the call.
pub struct WindowedCounter<T> {
    window_size: Duration,
    expiration_multiplier: u32,
    max_counters: Option<usize>,
    clock: Arc<dyn Clock>,
    cache: ExpiringCache<WindowKey<T>, AtomicI64>,
}

impl<T> Clone for WindowedCounter<T> {
    fn clone(&self) -> Self {
        WindowedCounter {
            window_size: self.window_size,
            expiration_multiplier: self.expiration_multiplier,
            max_counters: self.max_counters,
            clock: Arc::clone(&self.clock),
            cache: self.cache.clone(),
        }
    }
}

impl<T> WindowedCounter<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// A counter with the default expiration multiplier and a monotonic clock.
    pub fn new(window_size: Duration) -> Result<Self> {
        Self::builder(window_size).build()
    }

    pub fn builder(window_size: Duration) -> WindowedCounterBuilder<T> {
        WindowedCounterBuilder::new(window_size)
    }

    // -----------------------------------------------------------------------
    // Windowing
    // -----------------------------------------------------------------------

    /// Index of the window containing the clock's current reading.
    ///
    /// Recomputed on every call; never cached.
    pub fn current_window(&self) -> u64 {
        let elapsed = self.clock.elapsed().as_nanos();
        (elapsed / self.window_size.as_nanos()) as u64
    }

    /// Every window whose counters may still be in the cache, the current one
    /// included.
    ///
    /// The TTL runs from each counter's own creation rather than from a
    /// window boundary, so this range can include one window more than is
    /// strictly possible.  Invalidation relies on it never including fewer.
    fn cached_windows(&self) -> RangeInclusive<u64> {
        let current = self.current_window();
        current.saturating_sub(u64::from(self.expiration_multiplier))..=current
    }

    fn key(&self, item: &T) -> WindowKey<T> {
        WindowKey::new(self.current_window(), item.clone())
    }

    fn new_counter(&self) -> Result<AtomicI64> {
        if let Some(limit) = self.max_counters {
            if self.cache.entry_count() >= limit {
                return Err(Error::CapacityExceeded { limit });
            }
        }
        Ok(AtomicI64::new(0))
    }

    /// Runs a get-or-create `lookup`; if the counter limit is reached, sweeps
    /// expired counters and retries once.
    ///
    /// Old windows are never looked up again, so without the sweep their
    /// counters would hold the limit until someone called `clean_up`.  Must
    /// not be called with the scan lock held.
    fn with_room<R, L>(&self, mut lookup: L) -> Result<R>
    where
        L: FnMut() -> Result<R>,
    {
        match lookup() {
            Err(Error::CapacityExceeded { limit }) => {
                let swept = self.cache.clean_up();
                if swept == 0 {
                    return Err(Error::CapacityExceeded { limit });
                }
                debug!(swept, limit, "counter limit reached, swept expired counters");
                lookup()
            }
            res => res,
        }
    }

    /// Runs `op` against the counter for `item` in the current window.
    ///
    /// If no counter can be stored, `op` runs against a throwaway zero
    /// counter instead: the update is lost but the caller never sees an
    /// error.
    fn apply<R, F>(&self, item: &T, op: F) -> R
    where
        F: Fn(&AtomicI64) -> R,
    {
        let res = self.with_room(|| {
            self.cache
                .with_entry(self.key(item), || self.new_counter(), &op)
        });
        match res {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "windowed counter unavailable, update dropped");
                op(&AtomicI64::new(0))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Counter operations
    // -----------------------------------------------------------------------

    /// The live counter for `item` in the current window.
    ///
    /// Writes through the returned handle reach the stored counter for as
    /// long as its window lives.  When the counter cannot be stored (see
    /// [`WindowedCounterBuilder::max_counters`]) a detached zero counter is
    /// returned.
    pub fn counter_for(&self, item: &T) -> Arc<AtomicI64> {
        let res = self.with_room(|| self.cache.get_or_create(self.key(item), || self.new_counter()));
        match res {
            Ok(counter) => counter,
            Err(e) => {
                warn!(error = %e, "windowed counter unavailable, returning a detached counter");
                Arc::new(AtomicI64::new(0))
            }
        }
    }

    pub fn get(&self, item: &T) -> i64 {
        self.apply(item, |c| c.load(Ordering::Acquire))
    }

    /// Adds one and returns the new value.
    pub fn increment(&self, item: &T) -> i64 {
        self.add_and_get(item, 1)
    }

    /// Adds one and returns the previous value.
    pub fn get_and_increment(&self, item: &T) -> i64 {
        self.get_and_add(item, 1)
    }

    /// Subtracts one and returns the new value.
    pub fn decrement(&self, item: &T) -> i64 {
        self.add_and_get(item, -1)
    }

    /// Subtracts one and returns the previous value.
    pub fn get_and_decrement(&self, item: &T) -> i64 {
        self.get_and_add(item, -1)
    }

    pub fn add_and_get(&self, item: &T, delta: i64) -> i64 {
        self.apply(item, |c| c.fetch_add(delta, Ordering::AcqRel).wrapping_add(delta))
    }

    pub fn get_and_add(&self, item: &T, delta: i64) -> i64 {
        self.apply(item, |c| c.fetch_add(delta, Ordering::AcqRel))
    }

    pub fn set(&self, item: &T, value: i64) {
        self.apply(item, |c| c.store(value, Ordering::Release))
    }

    pub fn get_and_set(&self, item: &T, value: i64) -> i64 {
        self.apply(item, |c| c.swap(value, Ordering::AcqRel))
    }

    // -----------------------------------------------------------------------
    // Whole-window views
    // -----------------------------------------------------------------------

    /// The current window's counts as a multiset.
    ///
    /// Takes the cache's scan lock, so no counter changes while the snapshot
    /// is taken.  Items whose counter is zero or negative are left out.
    /// This is a full scan; keep it off hot paths.
    pub fn snapshot(&self) -> Multiset<T> {
        let current = self.current_window();
        let mut counts = Multiset::new();
        self.cache.for_each(|key, counter| {
            if key.window == current {
                let n = counter.load(Ordering::Acquire);
                if n > 0 {
                    counts.add_copies(key.item.clone(), n as u64);
                }
            }
        });
        counts
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Drops `item`'s counters in every window that may still be cached.
    pub fn invalidate(&self, item: &T) {
        let windows = self.cached_windows();
        self.cache
            .invalidate_many(windows.map(|w| WindowKey::new(w, item.clone())));
    }

    /// Drops the counters of every item in `items`, in every window that may
    /// still be cached.
    pub fn invalidate_many<'a, I>(&self, items: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let windows = self.cached_windows();
        self.cache.invalidate_many(
            items
                .into_iter()
                .flat_map(|item| windows.clone().map(move |w| WindowKey::new(w, item.clone()))),
        );
    }

    /// Drops every counter in every window.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    // -----------------------------------------------------------------------
    // Cache pass-through
    // -----------------------------------------------------------------------

    pub fn cache_stats(&self) -> Metrics {
        self.cache.stats()
    }

    /// Counters held, including expired ones not yet swept.
    pub fn cache_size(&self) -> usize {
        self.cache.entry_count()
    }

    /// Sweeps expired counters; returns how many were removed.
    pub fn clean_up(&self) -> usize {
        self.cache.clean_up()
    }

    pub fn window_size(&self) -> Duration {
        self.window_size
    }

    pub fn expiration_multiplier(&self) -> u32 {
        self.expiration_multiplier
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`WindowedCounter`].
///
/// # Example
/// ```
/// use lapse::WindowedCounter;
/// use std::time::Duration;
///
/// let counter: WindowedCounter<u32> = WindowedCounter::builder(Duration::from_secs(60))
///     .expiration_multiplier(3)
///     .max_counters(100_000)
///     .build()
///     .unwrap();
/// assert_eq!(counter.expiration_multiplier(), 3);
/// ```
pub struct WindowedCounterBuilder<T> {
    window_size: Duration,
    expiration_multiplier: u32,
    num_shards: usize,
    max_counters: Option<usize>,
    clock: Option<Arc<dyn Clock>>,
    _item: PhantomData<fn() -> T>,
}

impl<T> WindowedCounterBuilder<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(window_size: Duration) -> Self {
        WindowedCounterBuilder {
            window_size,
            expiration_multiplier: DEFAULT_EXPIRATION_MULTIPLIER,
            num_shards: DEFAULT_SHARDS,
            max_counters: None,
            clock: None,
            _item: PhantomData,
        }
    }

    /// How many window-widths a counter lives in the cache (default: 2).
    pub fn expiration_multiplier(mut self, multiplier: u32) -> Self {
        self.expiration_multiplier = multiplier;
        self
    }

    /// Number of cache shards (must be a power of two; default: 64).
    pub fn num_shards(mut self, n: usize) -> Self {
        self.num_shards = n;
        self
    }

    /// Refuse to store more than `limit` counters.
    ///
    /// Expired counters still occupy a slot until swept.  When the limit is
    /// reached the counter sweeps them and tries again; only if every stored
    /// counter is still live is the update dropped (and logged).
    pub fn max_counters(mut self, limit: usize) -> Self {
        self.max_counters = Some(limit);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<WindowedCounter<T>> {
        if self.window_size.is_zero() {
            return Err(Error::InvalidWindow);
        }
        if self.expiration_multiplier == 0 {
            return Err(Error::InvalidMultiplier);
        }
        validate_shards(self.num_shards)?;
        let ttl = self
            .window_size
            .checked_mul(self.expiration_multiplier)
            .ok_or(Error::TtlOverflow)?;

        let clock = self.clock.unwrap_or_else(default_clock);
        let cache = CacheBuilder::new(ttl)
            .clock(Arc::clone(&clock))
            .num_shards(self.num_shards)
            .build()?;

        Ok(WindowedCounter {
            window_size: self.window_size,
            expiration_multiplier: self.expiration_multiplier,
            max_counters: self.max_counters,
            clock,
            cache,
        })
    }
}
