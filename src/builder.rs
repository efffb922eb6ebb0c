use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ExpiringCache;
use crate::clock::{default_clock, Clock};
use crate::error::{Error, Result};
use crate::listener::{EvictionCause, EvictionListener, FnListener};

/// Default number of shards; enough to keep lock contention low on typical
/// core counts without bloating small caches.
pub(crate) const DEFAULT_SHARDS: usize = 64;

/// Builder for configuring and constructing an [`ExpiringCache`].
///
/// # Example
/// ```
/// use lapse::CacheBuilder;
/// use std::time::Duration;
///
/// let cache: lapse::ExpiringCache<String, String> = CacheBuilder::new(Duration::from_secs(60))
///     .num_shards(16)
///     .build()
///     .unwrap();
/// assert_eq!(cache.ttl(), Duration::from_secs(60));
/// ```
pub struct CacheBuilder<K, V> {
    ttl: Duration,
    num_shards: usize,
    clock: Option<Arc<dyn Clock>>,
    listener: Option<Box<dyn EvictionListener<K, V>>>,
}

impl<K: 'static, V: 'static> CacheBuilder<K, V> {
    /// Every entry expires `ttl` after it was **written**.
    pub fn new(ttl: Duration) -> Self {
        CacheBuilder {
            ttl,
            num_shards: DEFAULT_SHARDS,
            clock: None,
            listener: None,
        }
    }

    /// Set the number of internal shards (must be a power of two; default: 64).
    pub fn num_shards(mut self, n: usize) -> Self {
        self.num_shards = n;
        self
    }

    /// Read time from `clock` instead of a fresh [`MonotonicClock`](crate::clock::MonotonicClock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register an eviction listener closure.
    ///
    /// Do **not** call cache methods from within the closure.
    pub fn eviction_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&K, Arc<V>, EvictionCause) + Send + Sync + 'static,
    {
        self.listener = Some(Box::new(FnListener(f)));
        self
    }

    /// Register an eviction listener via the [`EvictionListener`] trait.
    pub fn eviction_listener_impl<L: EvictionListener<K, V>>(mut self, l: L) -> Self {
        self.listener = Some(Box::new(l));
        self
    }
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Validates the configuration and builds the cache.
    ///
    /// Fails with [`Error::InvalidTtl`] for a zero TTL and
    /// [`Error::InvalidShardCount`] unless `num_shards` is a power of two.
    pub fn build(self) -> Result<ExpiringCache<K, V>> {
        validate_shards(self.num_shards)?;
        if self.ttl.is_zero() {
            return Err(Error::InvalidTtl);
        }
        Ok(ExpiringCache::new(
            self.ttl,
            self.num_shards,
            self.clock.unwrap_or_else(default_clock),
            self.listener,
        ))
    }
}

pub(crate) fn validate_shards(n: usize) -> Result<()> {
    if n.is_power_of_two() {
        Ok(())
    } else {
        Err(Error::InvalidShardCount(n))
    }
}
