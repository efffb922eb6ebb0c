use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ahash::{AHashMap, RandomState};
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// StoreEntry
// ---------------------------------------------------------------------------

/// A single entry in the store.
///
/// `written_at` is the clock reading when the value was stored.  It is never
/// refreshed by reads, so the entry's lifetime is a pure function of
/// `written_at` and the cache TTL.
pub struct StoreEntry<V> {
    pub value: Arc<V>,
    pub written_at: Duration,
}

impl<V> StoreEntry<V> {
    #[inline]
    pub fn is_expired(&self, now: Duration, ttl: Duration) -> bool {
        now.saturating_sub(self.written_at) >= ttl
    }
}

/// `None` if absent, `Some(None)` if expired, `Some(Some(value))` if live.
#[inline]
fn live_value<V>(entry: Option<&StoreEntry<V>>, now: Duration, ttl: Duration) -> Option<Option<Arc<V>>> {
    entry.map(|e| (!e.is_expired(now, ttl)).then(|| Arc::clone(&e.value)))
}

/// Outcome of [`ShardedStore::get_or_create`].
pub(crate) enum Lookup<V> {
    /// A live entry was already present.
    Hit(Arc<V>),
    /// A new value was created.  `expired` holds the stale value it replaced.
    Created {
        value: Arc<V>,
        expired: Option<Arc<V>>,
    },
}

/// Outcome of [`ShardedStore::probe`].
pub(crate) enum Probe<V> {
    Live(Arc<V>),
    /// The entry had expired and has been removed.
    Expired(Arc<V>),
    Absent,
}

// ---------------------------------------------------------------------------
// Shard
// ---------------------------------------------------------------------------

/// Cache-line padding to prevent false sharing between shards.
#[repr(align(64))]
pub(crate) struct Shard<K, V> {
    pub(crate) map: RwLock<AHashMap<K, StoreEntry<V>>>,
}

// ---------------------------------------------------------------------------
// ShardedStore
// ---------------------------------------------------------------------------

/// A thread-safe key-value store backed by `N` independently-locked shards.
///
/// Reads use a shared lock, writes use an exclusive lock, both per-shard.
/// The total number of entries is tracked in an atomic so `len` never has to
/// visit the shards.
pub struct ShardedStore<K, V> {
    shards: Box<[Shard<K, V>]>,
    /// Always `shards.len() - 1`; shards.len() is a power of two.
    shard_mask: usize,
    /// Hasher used only to compute shard indices.
    build_hasher: RandomState,
    len: AtomicUsize,
}

impl<K: Hash + Eq, V> ShardedStore<K, V> {
    pub fn new(num_shards: usize) -> Self {
        debug_assert!(num_shards.is_power_of_two());
        let shards = (0..num_shards)
            .map(|_| Shard {
                map: RwLock::new(AHashMap::new()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        ShardedStore {
            shards,
            shard_mask: num_shards - 1,
            build_hasher: RandomState::new(),
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn shard_index<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        let h = self.build_hasher.hash_one(key);
        // Use the high bits (better avalanche from ahash).
        ((h >> 32) as usize) & self.shard_mask
    }

    #[inline]
    fn shard_for<Q>(&self, key: &Q) -> &Shard<K, V>
    where
        Q: Hash + ?Sized,
    {
        &self.shards[self.shard_index(key)]
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    /// Returns the live value for `key`, creating it with `factory` if the key
    /// is absent or its entry has expired.
    ///
    /// A live hit is served under the shard's read lock.  Otherwise the
    /// check-then-create sequence re-runs under the write lock, so racing
    /// callers for the same key observe exactly one stored value.  If
    /// `factory` fails nothing is stored, though a stale entry found on the
    /// way has already been dropped.
    pub(crate) fn get_or_create<E, F>(
        &self,
        key: K,
        now: Duration,
        ttl: Duration,
        factory: F,
    ) -> Result<Lookup<V>, (E, Option<Arc<V>>)>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let shard = self.shard_for(&key);
        if let Some(Some(value)) = live_value(shard.map.read().get(&key), now, ttl) {
            return Ok(Lookup::Hit(value));
        }

        // Missing or expired: another thread may get here first, so check again.
        let mut map = shard.map.write();
        let expired = match live_value(map.get(&key), now, ttl) {
            Some(Some(value)) => return Ok(Lookup::Hit(value)),
            Some(None) => map.remove(&key).map(|stale| {
                self.len.fetch_sub(1, Ordering::AcqRel);
                stale.value
            }),
            None => None,
        };

        let value = match factory() {
            Ok(v) => Arc::new(v),
            Err(e) => return Err((e, expired)),
        };
        map.insert(
            key,
            StoreEntry {
                value: Arc::clone(&value),
                written_at: now,
            },
        );
        self.len.fetch_add(1, Ordering::AcqRel);
        Ok(Lookup::Created { value, expired })
    }

    /// Looks `key` up, removing it if it has expired.
    pub(crate) fn probe<Q>(&self, key: &Q, now: Duration, ttl: Duration) -> Probe<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = self.shard_for(key);
        match live_value(shard.map.read().get(key), now, ttl) {
            None => return Probe::Absent,
            Some(Some(value)) => return Probe::Live(value),
            Some(None) => {}
        }

        // Expired: retake as a write lock and re-check, another thread may
        // have replaced the entry in between.
        let mut map = shard.map.write();
        match live_value(map.get(key), now, ttl) {
            None => Probe::Absent,
            Some(Some(value)) => Probe::Live(value),
            Some(None) => match map.remove(key) {
                Some(stale) => {
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    Probe::Expired(stale.value)
                }
                None => Probe::Absent,
            },
        }
    }

    /// Inserts `value` for `key`, written at `now`.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&self, key: K, value: V, now: Duration) -> Option<Arc<V>> {
        let old = self
            .shard_for(&key)
            .map
            .write()
            .insert(
                key,
                StoreEntry {
                    value: Arc::new(value),
                    written_at: now,
                },
            )
            .map(|old| old.value);
        if old.is_none() {
            self.len.fetch_add(1, Ordering::AcqRel);
        }
        old
    }

    /// Removes the entry for `key`.  Returns the removed value, if any.
    pub fn remove<Q>(&self, key: &Q) -> Option<Arc<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.shard_for(key).map.write().remove(key).map(|e| e.value);
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Returns `true` if `key` is present and unexpired.
    pub fn contains_live<Q>(&self, key: &Q, now: Duration, ttl: Duration) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key)
            .map
            .read()
            .get(key)
            .is_some_and(|e| !e.is_expired(now, ttl))
    }

    /// Returns the total number of entries across all shards, expired or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -----------------------------------------------------------------------
    // Whole-store operations
    // -----------------------------------------------------------------------

    /// Removes every expired entry, moving them into `out`.
    pub fn drain_expired(&self, now: Duration, ttl: Duration, out: &mut Vec<(K, Arc<V>)>)
    where
        K: Clone,
    {
        for shard in self.shards.iter() {
            let mut map = shard.map.write();
            let before = out.len();
            let stale: Vec<K> = map
                .iter()
                .filter(|(_, e)| e.is_expired(now, ttl))
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                if let Some(entry) = map.remove(&key) {
                    out.push((key, entry.value));
                }
            }
            self.len.fetch_sub(out.len() - before, Ordering::AcqRel);
        }
    }

    /// Removes every entry, moving them into `out`.
    pub fn drain_all(&self, out: &mut Vec<(K, Arc<V>)>) {
        for shard in self.shards.iter() {
            let mut map = shard.map.write();
            let before = out.len();
            out.extend(map.drain().map(|(k, e)| (k, e.value)));
            self.len.fetch_sub(out.len() - before, Ordering::AcqRel);
        }
    }

    /// Calls `visit` for every unexpired entry, one shard at a time.
    pub fn for_each_live<F>(&self, now: Duration, ttl: Duration, mut visit: F)
    where
        F: FnMut(&K, &V),
    {
        for shard in self.shards.iter() {
            for (key, entry) in shard.map.read().iter() {
                if !entry.is_expired(now, ttl) {
                    visit(key, &entry.value);
                }
            }
        }
    }
}
