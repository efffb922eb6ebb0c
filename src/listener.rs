//! Eviction listener: a callback invoked whenever an entry leaves the cache.
//!
//! # Example
//! ```
//! use lapse::CacheBuilder;
//! use lapse::listener::EvictionCause;
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! let log: Arc<Mutex<Vec<(u64, EvictionCause)>>> = Arc::new(Mutex::new(Vec::new()));
//! let log2 = Arc::clone(&log);
//!
//! let cache: lapse::ExpiringCache<u64, u64> = CacheBuilder::new(Duration::from_secs(30))
//!     .eviction_listener(move |key: &u64, _val, cause| {
//!         log2.lock().unwrap().push((*key, cause));
//!     })
//!     .build()
//!     .unwrap();
//!
//! cache.insert(1, 10);
//! cache.invalidate(&1);
//! assert_eq!(log.lock().unwrap().as_slice(), &[(1, EvictionCause::Explicit)]);
//! ```

use std::sync::Arc;

// ---------------------------------------------------------------------------
// EvictionCause
// ---------------------------------------------------------------------------

/// The reason an entry was removed from the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictionCause {
    /// Its time-to-live elapsed.  Reported when the entry is swept, either
    /// lazily by a lookup or eagerly by
    /// [`ExpiringCache::clean_up`](crate::ExpiringCache::clean_up).
    Expired,
    /// Removed via one of the `invalidate*` methods.
    Explicit,
}

// ---------------------------------------------------------------------------
// EvictionListener trait
// ---------------------------------------------------------------------------

/// A callback invoked each time an entry is evicted or invalidated.
///
/// The callback receives the key, the removed value and the reason for
/// removal.  It runs on the thread that triggered the removal, after the
/// shard lock has been released, but possibly while a full scan holds the
/// cache's scan lock.  **Do not call any cache method from inside the
/// listener.**
pub trait EvictionListener<K, V>: Send + Sync + 'static {
    fn on_evict(&self, key: &K, value: Arc<V>, cause: EvictionCause);
}

/// An [`EvictionListener`] backed by a closure.
///
/// Created via [`CacheBuilder::eviction_listener`](crate::CacheBuilder::eviction_listener).
pub struct FnListener<F>(pub F);

impl<K, V, F> EvictionListener<K, V> for FnListener<F>
where
    F: Fn(&K, Arc<V>, EvictionCause) + Send + Sync + 'static,
{
    fn on_evict(&self, key: &K, value: Arc<V>, cause: EvictionCause) {
        (self.0)(key, value, cause)
    }
}
