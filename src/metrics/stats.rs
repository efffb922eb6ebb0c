use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic counters updated by cache lookups, loads and removals.
pub struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    /// Nanoseconds spent inside factories, successful or not.
    load_nanos: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        StatsCounter {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            load_successes: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            load_nanos: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self, count: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Records one factory call and how long it ran.
    pub fn record_load(&self, succeeded: bool, took: Duration) {
        let counter = if succeeded {
            &self.load_successes
        } else {
            &self.load_failures
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(took.as_nanos()).unwrap_or(u64::MAX);
        self.load_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            load_success_count: self.load_successes.load(Ordering::Relaxed),
            load_failure_count: self.load_failures.load(Ordering::Relaxed),
            total_load_time: Duration::from_nanos(self.load_nanos.load(Ordering::Relaxed)),
        }
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of cache statistics.
///
/// Every counter only grows over the life of the cache; use
/// [`minus`](Metrics::minus) to get the activity between two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Lookups that found a live entry.
    pub hit_count: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub miss_count: u64,
    /// Entries removed from the cache, whether by expiry or by explicit
    /// invalidation.
    pub eviction_count: u64,
    /// Factory calls that produced a value.
    pub load_success_count: u64,
    /// Factory calls that returned an error.
    pub load_failure_count: u64,
    /// Time spent in factory calls, as read from the cache's clock.
    pub total_load_time: Duration,
}

impl Metrics {
    pub fn request_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    /// `hits / requests`, or `1.0` if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        match self.request_count() {
            0 => 1.0,
            total => self.hit_count as f64 / total as f64,
        }
    }

    /// `misses / requests`, or `0.0` if no requests have been made.
    pub fn miss_rate(&self) -> f64 {
        match self.request_count() {
            0 => 0.0,
            total => self.miss_count as f64 / total as f64,
        }
    }

    pub fn load_count(&self) -> u64 {
        self.load_success_count + self.load_failure_count
    }

    /// `failures / loads`, or `0.0` if nothing was loaded.
    pub fn load_failure_rate(&self) -> f64 {
        match self.load_count() {
            0 => 0.0,
            total => self.load_failure_count as f64 / total as f64,
        }
    }

    /// Mean time per factory call, or zero if nothing was loaded.
    pub fn average_load_time(&self) -> Duration {
        match self.load_count() {
            0 => Duration::ZERO,
            total => {
                Duration::from_nanos((self.total_load_time.as_nanos() / u128::from(total)) as u64)
            }
        }
    }

    /// Activity between `earlier` and `self`.  Fields that went backwards
    /// (snapshots of different caches) are clamped to zero.
    pub fn minus(&self, earlier: &Metrics) -> Metrics {
        Metrics {
            hit_count: self.hit_count.saturating_sub(earlier.hit_count),
            miss_count: self.miss_count.saturating_sub(earlier.miss_count),
            eviction_count: self.eviction_count.saturating_sub(earlier.eviction_count),
            load_success_count: self
                .load_success_count
                .saturating_sub(earlier.load_success_count),
            load_failure_count: self
                .load_failure_count
                .saturating_sub(earlier.load_failure_count),
            total_load_time: self.total_load_time.saturating_sub(earlier.total_load_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = StatsCounter::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_eviction(3);
        stats.record_eviction(0);

        let m = stats.snapshot();
        assert_eq!(
            m,
            Metrics {
                hit_count: 2,
                miss_count: 1,
                eviction_count: 3,
                ..Metrics::default()
            }
        );
        assert_eq!(m.request_count(), 3);
        assert!((m.hit_rate() - 2.0 / 3.0).abs() < 1e-9, "hit_rate = {}", m.hit_rate());
        assert!((m.miss_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_rates() {
        let m = StatsCounter::default().snapshot();
        assert_eq!(m.request_count(), 0);
        assert_eq!(m.hit_rate(), 1.0);
        assert_eq!(m.miss_rate(), 0.0);
        assert_eq!(m.load_failure_rate(), 0.0);
        assert_eq!(m.average_load_time(), Duration::ZERO);
    }

    #[test]
    fn loads_split_by_outcome() {
        let stats = StatsCounter::new();
        stats.record_load(true, Duration::from_millis(30));
        stats.record_load(true, Duration::from_millis(10));
        stats.record_load(false, Duration::from_millis(20));

        let m = stats.snapshot();
        assert_eq!(m.load_count(), 3);
        assert_eq!(m.load_success_count, 2);
        assert_eq!(m.load_failure_count, 1);
        assert_eq!(m.total_load_time, Duration::from_millis(60));
        assert_eq!(m.average_load_time(), Duration::from_millis(20));
        assert!((m.load_failure_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn minus_clamps_at_zero() {
        let earlier = Metrics {
            hit_count: 5,
            miss_count: 1,
            total_load_time: Duration::from_secs(2),
            ..Metrics::default()
        };
        let later = Metrics {
            hit_count: 8,
            miss_count: 1,
            eviction_count: 4,
            total_load_time: Duration::from_secs(1),
            ..Metrics::default()
        };
        let delta = later.minus(&earlier);
        assert_eq!(delta.hit_count, 3);
        assert_eq!(delta.miss_count, 0);
        assert_eq!(delta.eviction_count, 4);
        assert_eq!(delta.total_load_time, Duration::ZERO);
    }
}
