use lapse::clock::ManualClock;
use lapse::{Error, Multiset, WindowedCounter, DEFAULT_EXPIRATION_MULTIPLIER};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(5);

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

/// A counter over 5s windows driven by a manual clock, plus its multiplier.
/// `None` builds with the default multiplier.
fn make_counter(multiplier: Option<u32>) -> (WindowedCounter<&'static str>, Arc<ManualClock>, u64) {
    let clock = Arc::new(ManualClock::new());
    let mut builder = WindowedCounter::builder(WINDOW).clock(clock.clone());
    if let Some(m) = multiplier {
        builder = builder.expiration_multiplier(m);
    }
    let counter = builder.build().unwrap();
    let m = multiplier.unwrap_or(DEFAULT_EXPIRATION_MULTIPLIER);
    (counter, clock, u64::from(m))
}

/// Every configuration the behavioural tests run against.
fn all_counters() -> Vec<(WindowedCounter<&'static str>, Arc<ManualClock>, u64)> {
    [None, Some(1), Some(2), Some(3)]
        .into_iter()
        .map(make_counter)
        .collect()
}

fn assert_counter_stats(
    counter: &WindowedCounter<&'static str>,
    size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
) {
    let stats = counter.cache_stats();
    assert_eq!(
        (counter.cache_size(), stats.hit_count, stats.miss_count, stats.eviction_count),
        (size, hits, misses, evictions),
        "(size, hits, misses, evictions) with multiplier {}",
        counter.expiration_multiplier()
    );
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn rejects_invalid_configuration() {
    assert_eq!(
        WindowedCounter::<u8>::new(Duration::ZERO).err(),
        Some(Error::InvalidWindow)
    );
    assert_eq!(
        WindowedCounter::<u8>::builder(WINDOW)
            .expiration_multiplier(0)
            .build()
            .err(),
        Some(Error::InvalidMultiplier)
    );
    assert_eq!(
        WindowedCounter::<u8>::builder(Duration::MAX)
            .expiration_multiplier(2)
            .build()
            .err(),
        Some(Error::TtlOverflow)
    );
    assert_eq!(
        WindowedCounter::<u8>::builder(WINDOW).num_shards(6).build().err(),
        Some(Error::InvalidShardCount(6))
    );
}

// ---------------------------------------------------------------------------
// Windowing
// ---------------------------------------------------------------------------

#[test]
fn window_index_advances_exactly_at_boundaries() {
    let (counter, clock, _) = make_counter(None);
    assert_eq!(counter.current_window(), 0);

    clock.advance(WINDOW - Duration::from_nanos(1));
    assert_eq!(counter.current_window(), 0);

    clock.advance(Duration::from_nanos(1));
    assert_eq!(counter.current_window(), 1);

    clock.advance(WINDOW);
    assert_eq!(counter.current_window(), 2);

    clock.advance(secs(12));
    assert_eq!(counter.current_window(), 4);
}

#[test]
fn increments_within_a_window_accumulate() {
    for (counter, _, _) in all_counters() {
        assert_counter_stats(&counter, 0, 0, 0, 0);
        assert_eq!(counter.increment(&"abc"), 1);
        assert_eq!(counter.increment(&"def"), 1);
        assert_eq!(counter.increment(&"abc"), 2);
        assert_counter_stats(&counter, 2, 1, 2, 0);

        for _ in 0..10 {
            counter.increment(&"ghi");
        }
        assert_eq!(counter.get(&"ghi"), 10);
    }
}

#[test]
fn ticking_into_a_new_window_starts_fresh_counters() {
    for (counter, clock, multiplier) in all_counters() {
        counter.increment(&"abc");
        counter.increment(&"def");
        counter.increment(&"abc");
        assert_counter_stats(&counter, 2, 1, 2, 0);

        // Same window
        clock.advance(secs(4));
        assert_eq!(counter.increment(&"def"), 2);
        assert_counter_stats(&counter, 2, 2, 2, 0);

        // Next window
        clock.advance(secs(1));
        assert_eq!(counter.increment(&"abc"), 1);
        assert_eq!(counter.increment(&"def"), 1);
        assert_eq!(counter.increment(&"ghi"), 1);

        // Sweep so the size reflects live counters only.
        counter.clean_up();
        let expired = if multiplier == 1 { 2 } else { 0 };
        assert_counter_stats(&counter, 5 - expired as usize, 2, 5, expired);
    }
}

#[test]
fn old_windows_are_evicted_after_ttl() {
    for (counter, clock, multiplier) in all_counters() {
        counter.increment(&"abc");
        assert_counter_stats(&counter, 1, 0, 1, 0);

        for i in 0..10u64 {
            clock.advance(WINDOW);
            assert_eq!(counter.increment(&"abc"), 1);

            counter.clean_up();
            assert_counter_stats(
                &counter,
                (2 + i).min(multiplier) as usize,
                0,
                2 + i,
                (2 + i).saturating_sub(multiplier),
            );
        }
    }
}

#[test]
fn concrete_five_second_scenario() {
    let (counter, clock, _) = make_counter(Some(2));

    counter.increment(&"abc");
    assert_eq!(counter.get(&"abc"), 1);
    counter.increment(&"abc");
    assert_eq!(counter.get(&"abc"), 2);

    clock.advance(secs(5));
    counter.increment(&"abc");
    assert_eq!(counter.get(&"abc"), 1, "window 0's count is not visible");

    clock.advance(secs(5));
    assert_eq!(counter.clean_up(), 1, "the window-0 counter written at t=0 expired at t=10");
    assert_eq!(counter.cache_size(), 1);
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

#[test]
fn atomic_operations_mirror_their_names() {
    let (counter, _, _) = make_counter(None);
    let item = &"x";

    assert_eq!(counter.get_and_increment(item), 0);
    assert_eq!(counter.get(item), 1);
    assert_eq!(counter.add_and_get(item, 10), 11);
    assert_eq!(counter.get_and_add(item, 5), 11);
    assert_eq!(counter.decrement(item), 15);
    assert_eq!(counter.get_and_decrement(item), 15);
    assert_eq!(counter.get_and_set(item, 100), 14);
    counter.set(item, -3);
    assert_eq!(counter.get(item), -3);
}

#[test]
fn counter_handle_writes_through() {
    let (counter, clock, _) = make_counter(None);
    let handle = counter.counter_for(&"h");
    handle.fetch_add(41, Ordering::SeqCst);
    assert_eq!(counter.increment(&"h"), 42);

    clock.advance(WINDOW);
    handle.fetch_add(1, Ordering::SeqCst);
    assert_eq!(counter.get(&"h"), 0, "a handle from an old window does not leak forward");
}

#[test]
fn concurrent_increments_are_never_lost() {
    let counter: WindowedCounter<u32> = WindowedCounter::new(Duration::from_secs(3600)).unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let counter = counter.clone();
            std::thread::spawn(move || {
                for i in 0..1_000u32 {
                    counter.increment(&(i % 4));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let window = counter.current_window();
    for item in 0..4 {
        assert_eq!(counter.get(&item), 2_000, "item {item} in window {window}");
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[test]
fn snapshot_contains_only_the_current_window() {
    let (counter, clock, _) = make_counter(Some(3));
    counter.add_and_get(&"old", 4);
    counter.increment(&"both");

    clock.advance(WINDOW);
    counter.add_and_get(&"both", 2);
    counter.add_and_get(&"new", 3);
    counter.set(&"zero", 0);
    counter.set(&"negative", -2);

    let expected: Multiset<&str> = [("both", 2), ("new", 3)].into_iter().collect();
    assert_eq!(counter.snapshot(), expected);
    assert_eq!(counter.snapshot().len(), 5);

    clock.advance(WINDOW);
    assert!(counter.snapshot().is_empty(), "a new window starts empty");
}

#[test]
fn snapshot_never_observes_a_partial_update() {
    const STEP: i64 = 7;
    let counter: WindowedCounter<u32> = WindowedCounter::new(Duration::from_secs(3600)).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4u32)
        .map(|t| {
            let counter = counter.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut ops = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let item = (t + ops as u32) % 4;
                    assert_eq!(counter.add_and_get(&item, STEP) % STEP, 0);
                    ops += 1;
                }
                ops
            })
        })
        .collect();

    for _ in 0..200 {
        for (item, count) in counter.snapshot().iter() {
            assert_eq!(count % STEP as u64, 0, "item {item} seen mid-update at {count}");
        }
    }
    stop.store(true, Ordering::Relaxed);
    let ops: u64 = writers.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(counter.snapshot().len(), ops * STEP as u64, "no update lost to a scan");
}

// ---------------------------------------------------------------------------
// Invalidation
// ---------------------------------------------------------------------------

/// Builds three items across windows 0 and 1:
/// t=0 abc, def (window 0); t=4 def, ghi (window 0); t=5 abc, def, ghi (window 1).
fn populate(counter: &WindowedCounter<&'static str>, clock: &ManualClock) {
    counter.increment(&"abc");
    counter.increment(&"def");
    counter.increment(&"abc");
    assert_counter_stats(counter, 2, 1, 2, 0);

    clock.advance(secs(4));
    counter.increment(&"def");
    counter.increment(&"ghi");
    assert_counter_stats(counter, 3, 2, 3, 0);

    clock.advance(secs(1));
    counter.increment(&"abc");
    counter.increment(&"def");
    counter.increment(&"ghi");
}

#[test]
fn invalidate_clears_every_possibly_live_window() {
    for (counter, clock, multiplier) in all_counters() {
        populate(&counter, &clock);

        counter.clean_up();
        // With a multiplier of 1 the window-0 counters written at t=0 are gone.
        let expired = if multiplier == 1 { 2 } else { 0 };
        assert_counter_stats(&counter, 6 - expired as usize, 2, 6, expired);

        let live_abc = if multiplier == 1 { 1 } else { 2 };
        counter.invalidate(&"abc");
        assert_counter_stats(&counter, 4 - (expired as usize).saturating_sub(1), 2, 6, expired + live_abc);
        // Every counter ever created has now left, by expiry or invalidation.
        counter.invalidate(&"def");
        assert_counter_stats(&counter, 2, 2, 6, 4);
        counter.invalidate(&"ghi");
        assert_counter_stats(&counter, 0, 2, 6, 6);
        counter.invalidate(&"jkl");
        assert_counter_stats(&counter, 0, 2, 6, 6);
    }
}

#[test]
fn invalidate_many_clears_each_item() {
    for (counter, clock, multiplier) in all_counters() {
        populate(&counter, &clock);

        counter.clean_up();
        let expired = if multiplier == 1 { 2 } else { 0 };
        assert_counter_stats(&counter, 6 - expired as usize, 2, 6, expired);

        counter.invalidate_many(&["abc", "def", "jkl"]);
        assert_counter_stats(&counter, 2, 2, 6, 4);
        assert_eq!(counter.snapshot(), [("ghi", 1)].into_iter().collect::<Multiset<_>>());
    }
}

#[test]
fn invalidate_all_drops_every_counter() {
    let (counter, clock, _) = make_counter(None);
    populate(&counter, &clock);
    counter.invalidate_all();
    assert_eq!(counter.cache_size(), 0);
    assert_eq!(counter.get(&"abc"), 0);
}

// ---------------------------------------------------------------------------
// Bounded memory
// ---------------------------------------------------------------------------

#[test]
fn counter_limit_degrades_to_detached_counters() {
    let clock = Arc::new(ManualClock::new());
    let counter: WindowedCounter<&str> = WindowedCounter::builder(WINDOW)
        .clock(clock.clone())
        .max_counters(2)
        .build()
        .unwrap();

    assert_eq!(counter.increment(&"a"), 1);
    assert_eq!(counter.increment(&"b"), 1);
    // No room for a third counter: the update succeeds but is not kept.
    assert_eq!(counter.increment(&"c"), 1);
    assert_eq!(counter.increment(&"c"), 1);
    assert_eq!(counter.cache_size(), 2);
    assert_eq!(counter.increment(&"a"), 2, "existing counters keep working");

    // Once old counters are swept there is room again.
    clock.advance(WINDOW * 2);
    counter.clean_up();
    assert_eq!(counter.increment(&"c"), 1);
    assert_eq!(counter.increment(&"c"), 2);
}

#[test]
fn counter_limit_sweeps_expired_counters_on_its_own() {
    let clock = Arc::new(ManualClock::new());
    let counter: WindowedCounter<&str> = WindowedCounter::builder(WINDOW)
        .clock(clock.clone())
        .max_counters(2)
        .build()
        .unwrap();

    counter.increment(&"a");
    counter.increment(&"b");
    clock.advance(secs(60));

    // No explicit clean_up: hitting the limit sweeps the stale windows.
    assert_eq!(counter.increment(&"c"), 1);
    assert_eq!(counter.increment(&"c"), 2);
    assert_eq!(counter.increment(&"c"), 3);
    assert_eq!(counter.get(&"c"), 3);
    assert_eq!(counter.cache_size(), 1);
    assert_eq!(counter.cache_stats().eviction_count, 2);
}

#[test]
fn counter_for_hands_out_a_detached_handle_when_full() {
    let counter: WindowedCounter<&str> = WindowedCounter::builder(WINDOW)
        .clock(Arc::new(ManualClock::new()))
        .max_counters(1)
        .build()
        .unwrap();

    let stored = counter.counter_for(&"a");
    stored.fetch_add(3, Ordering::SeqCst);
    assert_eq!(counter.get(&"a"), 3);

    let detached = counter.counter_for(&"b");
    assert_eq!(detached.load(Ordering::SeqCst), 0);
    detached.fetch_add(5, Ordering::SeqCst);
    assert_eq!(counter.get(&"b"), 0, "writes through a detached handle are not kept");
    assert!(!Arc::ptr_eq(&detached, &counter.counter_for(&"b")));
    assert_eq!(counter.cache_size(), 1);
    assert_eq!(counter.cache_stats().load_failure_count, 3);
}
