use std::borrow::Borrow;
use std::convert::Infallible;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::builder::CacheBuilder;
use crate::clock::Clock;
use crate::listener::{EvictionCause, EvictionListener};
use crate::metrics::stats::{Metrics, StatsCounter};
use crate::store::sharded::{Lookup, Probe, ShardedStore};

// ---------------------------------------------------------------------------
// Cache interior
// ---------------------------------------------------------------------------

/// Shared interior of an [`ExpiringCache`].
pub(crate) struct Inner<K, V> {
    pub(crate) store: ShardedStore<K, V>,
    pub(crate) ttl: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    /// Optional eviction listener.  `None` if the user didn't register one.
    pub(crate) listener: Option<Box<dyn EvictionListener<K, V>>>,
    /// Single-key operations hold this shared; full scans hold it exclusive so
    /// they observe a stable table.
    pub(crate) scan_lock: RwLock<()>,
    pub(crate) metrics: StatsCounter,
}

// ---------------------------------------------------------------------------
// Cache handle
// ---------------------------------------------------------------------------

/// A concurrent in-memory cache whose entries expire a fixed time after they
/// were written.
///
/// Expiry is lazy: an expired entry keeps its slot until a lookup trips over
/// it or [`clean_up`](ExpiringCache::clean_up) sweeps the table.  Until then
/// it is invisible to every read but still counted by
/// [`entry_count`](ExpiringCache::entry_count).
///
/// # Example
/// ```
/// use lapse::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: lapse::ExpiringCache<String, u64> = CacheBuilder::new(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// let v = cache.get_or_insert_with("hello".to_string(), || 42);
/// assert_eq!(*v, 42);
/// assert_eq!(cache.stats().miss_count, 1);
/// ```
pub struct ExpiringCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for ExpiringCache<K, V> {
    fn clone(&self) -> Self {
        ExpiringCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ExpiringCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(
        ttl: Duration,
        num_shards: usize,
        clock: Arc<dyn Clock>,
        listener: Option<Box<dyn EvictionListener<K, V>>>,
    ) -> Self {
        ExpiringCache {
            inner: Arc::new(Inner {
                store: ShardedStore::new(num_shards),
                ttl,
                clock,
                listener,
                scan_lock: RwLock::new(()),
                metrics: StatsCounter::new(),
            }),
        }
    }

    /// Returns a [`CacheBuilder`] for constructing a new cache.
    pub fn builder(ttl: Duration) -> CacheBuilder<K, V> {
        CacheBuilder::new(ttl)
    }

    #[inline]
    fn now(&self) -> Duration {
        self.inner.clock.elapsed()
    }

    // -----------------------------------------------------------------------
    // Hot-path: get-or-create
    // -----------------------------------------------------------------------

    /// Returns the live value for `key`, creating it with `factory` on a miss.
    ///
    /// Creation is atomic per key: when several threads race on the same
    /// absent key, exactly one value is stored and every caller receives it.
    /// If `factory` fails its error is returned and nothing is stored.
    pub fn get_or_create<E, F>(&self, key: K, factory: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let _scan = self.inner.scan_lock.read();
        self.lookup_or_create(key, factory)
    }

    /// Infallible form of [`get_or_create`](ExpiringCache::get_or_create).
    pub fn get_or_insert_with<F>(&self, key: K, init: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        match self.get_or_create(key, || Ok::<_, Infallible>(init())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Get-or-create `key`, then run `op` on its value before any full scan
    /// can start.
    ///
    /// Updates made to interior-mutable values through `op` are therefore
    /// either wholly visible or wholly invisible to a concurrent
    /// [`for_each`](ExpiringCache::for_each).
    pub fn with_entry<E, F, G, R>(&self, key: K, factory: F, op: G) -> Result<R, E>
    where
        F: FnOnce() -> Result<V, E>,
        G: FnOnce(&V) -> R,
    {
        let _scan = self.inner.scan_lock.read();
        let value = self.lookup_or_create(key, factory)?;
        Ok(op(&value))
    }

    /// Caller holds the scan lock shared.
    fn lookup_or_create<E, F>(&self, key: K, factory: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let now = self.now();
        let timed_factory = || {
            let start = self.now();
            let res = factory();
            let took = self.now().saturating_sub(start);
            self.inner.metrics.record_load(res.is_ok(), took);
            res
        };
        let lookup = match self
            .inner
            .store
            .get_or_create(key.clone(), now, self.inner.ttl, timed_factory)
        {
            Ok(lookup) => lookup,
            Err((e, expired)) => {
                self.inner.metrics.record_miss();
                if let Some(stale) = expired {
                    self.on_expired(&key, stale);
                }
                return Err(e);
            }
        };

        match lookup {
            Lookup::Hit(value) => {
                self.inner.metrics.record_hit();
                Ok(value)
            }
            Lookup::Created { value, expired } => {
                self.inner.metrics.record_miss();
                if let Some(stale) = expired {
                    self.on_expired(&key, stale);
                }
                Ok(value)
            }
        }
    }

    fn on_expired(&self, key: &K, value: Arc<V>) {
        trace!("lazily expired cache entry");
        self.inner.metrics.record_eviction(1);
        if let Some(listener) = &self.inner.listener {
            listener.on_evict(key, value, EvictionCause::Expired);
        }
    }

    // -----------------------------------------------------------------------
    // Plain reads and writes
    // -----------------------------------------------------------------------

    /// Returns the value for `key` if it exists and has not expired.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let _scan = self.inner.scan_lock.read();
        match self.inner.store.probe(key, self.now(), self.inner.ttl) {
            Probe::Live(value) => {
                self.inner.metrics.record_hit();
                Some(value)
            }
            Probe::Expired(value) => {
                self.inner.metrics.record_miss();
                self.on_expired(key, value);
                None
            }
            Probe::Absent => {
                self.inner.metrics.record_miss();
                None
            }
        }
    }

    /// Stores `value` for `key`, replacing any previous value and restarting
    /// the entry's time-to-live.
    pub fn insert(&self, key: K, value: V) {
        let _scan = self.inner.scan_lock.read();
        self.inner.store.insert(key, value, self.now());
    }

    /// Returns `true` if `key` has a live entry.  Does not touch statistics.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .store
            .contains_live(key, self.now(), self.inner.ttl)
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    /// Removes the entry for `key`, expired or not.
    pub fn invalidate(&self, key: &K) {
        let _scan = self.inner.scan_lock.read();
        self.invalidate_locked(key);
    }

    /// Removes the entries for every key in `keys`.
    pub fn invalidate_many<I, Q>(&self, keys: I)
    where
        I: IntoIterator<Item = Q>,
        Q: Borrow<K>,
    {
        let _scan = self.inner.scan_lock.read();
        let mut removed = 0usize;
        for key in keys {
            if self.invalidate_locked(key.borrow()) {
                removed += 1;
            }
        }
        debug!(removed, "invalidated cache entries");
    }

    fn invalidate_locked(&self, key: &K) -> bool {
        let Some(value) = self.inner.store.remove(key) else {
            return false;
        };
        self.inner.metrics.record_eviction(1);
        if let Some(listener) = &self.inner.listener {
            listener.on_evict(key, value, EvictionCause::Explicit);
        }
        true
    }

    /// Removes all entries.
    pub fn invalidate_all(&self) {
        let _scan = self.inner.scan_lock.write();
        let mut removed = Vec::new();
        self.inner.store.drain_all(&mut removed);
        self.dispatch_evictions(removed, EvictionCause::Explicit);
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Eagerly removes every expired entry and returns how many were removed.
    pub fn clean_up(&self) -> usize {
        let _scan = self.inner.scan_lock.write();
        let mut expired = Vec::new();
        self.inner
            .store
            .drain_expired(self.now(), self.inner.ttl, &mut expired);
        let n = expired.len();
        self.dispatch_evictions(expired, EvictionCause::Expired);
        debug!(evicted = n, remaining = self.inner.store.len(), "cache clean-up");
        n
    }

    /// Records removed entries and fires the listener for each.
    fn dispatch_evictions(&self, removed: Vec<(K, Arc<V>)>, cause: EvictionCause) {
        self.inner.metrics.record_eviction(removed.len() as u64);
        if let Some(listener) = &self.inner.listener {
            for (key, value) in removed {
                listener.on_evict(&key, value, cause);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Full scans
    // -----------------------------------------------------------------------

    /// Visits every live entry while holding the scan lock exclusively.
    ///
    /// Single-key operations wait until the scan finishes, so the visitor sees
    /// a table nothing else is changing.  The visitor must not call back into
    /// the cache.
    pub fn for_each<F>(&self, visit: F)
    where
        F: FnMut(&K, &V),
    {
        let _scan = self.inner.scan_lock.write();
        self.inner
            .store
            .for_each_live(self.now(), self.inner.ttl, visit);
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    /// Number of entries held, including expired entries not yet swept.
    pub fn entry_count(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}
