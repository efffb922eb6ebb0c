//! Time-based eviction primitives.
//!
//! - [`ExpiringCache`]: a concurrent map whose entries expire a fixed time
//!   after they were written, with lazy expiry, eager clean-up and
//!   hit/miss/eviction statistics.
//! - [`WindowedCounter`]: atomic per-item counters bucketed into fixed-width
//!   time windows, stored in an [`ExpiringCache`].
//! - [`ExpiringSet`]: a single-threaded set whose items carry their own
//!   lifetime, swept lazily as it is traversed.
//!
//! Every type reads time through a [`Clock`](clock::Clock), so tests can drive
//! expiry with a [`ManualClock`](clock::ManualClock).

mod builder;
mod cache;
mod counter;
mod error;
mod metrics;
mod multiset;
mod store;
pub mod clock;
pub mod collect;
pub mod listener;

pub use builder::CacheBuilder;
pub use cache::ExpiringCache;
pub use collect::{ExpiringIter, ExpiringSet, ExpiringSetBuilder, Mode};
pub use counter::{WindowKey, WindowedCounter, WindowedCounterBuilder, DEFAULT_EXPIRATION_MULTIPLIER};
pub use error::{Error, Result};
pub use metrics::stats::Metrics;
pub use multiset::Multiset;
