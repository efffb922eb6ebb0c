//! Time sources.
//!
//! Every time-based structure in this crate reads time through a [`Clock`]
//! that reports the [`Duration`] elapsed since the clock was created.  The
//! absolute epoch never matters; only differences between two readings do.
//!
//! [`MonotonicClock`] is the production default.  [`ManualClock`] only moves
//! when told to, which makes window rollovers and expirations deterministic
//! in tests.
//!
//! # Example
//! ```
//! use lapse::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! assert_eq!(clock.elapsed(), Duration::ZERO);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of elapsed time.
///
/// Implementations must be `Send + Sync` so a single clock can be shared (via
/// `Arc`) between a counter and the cache underneath it.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Time elapsed since this clock's epoch.  Never decreases.
    fn elapsed(&self) -> Duration;
}

/// Wall-clock-independent monotonic time backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// A clock that stands still until [`advance`](ManualClock::advance) is called.
///
/// Only the thread driving a test should advance it.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `by`, stopping at the largest reading it
    /// can represent (about 584 years).
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(by)));
    }
}

impl Clock for ManualClock {
    #[inline]
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// The clock used when a builder is not given one.
pub(crate) fn default_clock() -> Arc<dyn Clock> {
    Arc::new(MonotonicClock::new())
}
