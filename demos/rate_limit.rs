//! Fixed-window rate limiting with request de-duplication.
//!
//! A [`WindowedCounter`] caps each client at `LIMIT` requests per window, and
//! an [`ExpiringSet`] drops retried request ids seen in the last few seconds.
//! The simulated traffic is driven by a [`ManualClock`] so the output is
//! deterministic.
//!
//! Run with:
//!     RUST_LOG=rate_limit=debug cargo run --example rate_limit

use lapse::clock::ManualClock;
use lapse::{ExpiringSet, Mode, WindowedCounter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WINDOW: Duration = Duration::from_secs(1);
const LIMIT: i64 = 5;
const DEDUP_FOR: Duration = Duration::from_secs(3);

#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Accepted,
    Duplicate,
    Throttled,
}

struct Gate {
    per_client: WindowedCounter<String>,
    recent: ExpiringSet<u64>,
}

impl Gate {
    fn admit(&mut self, client: &str, request_id: u64) -> Verdict {
        // Retries inside the dedup window are absorbed before they count.
        if !self.recent.add(request_id).unwrap_or(true) {
            return Verdict::Duplicate;
        }
        let seen = self.per_client.increment(&client.to_string());
        if seen > LIMIT {
            return Verdict::Throttled;
        }
        Verdict::Accepted
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rate_limit=info,lapse=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock = Arc::new(ManualClock::new());
    let mut gate = Gate {
        per_client: WindowedCounter::builder(WINDOW)
            .clock(clock.clone())
            .max_counters(10_000)
            .build()?,
        recent: ExpiringSet::<u64>::builder(Mode::AfterCreation)
            .default_expiry(DEDUP_FOR)
            .clock(clock.clone())
            .build()?,
    };

    let clients = ["alice", "bob", "carol"];
    let mut request_id = 0u64;
    let (mut accepted, mut duplicate, mut throttled) = (0u32, 0u32, 0u32);

    for tick in 0..20u64 {
        for (i, client) in clients.iter().enumerate() {
            // alice is noisy, bob retries every other request, carol is quiet.
            let burst = match i {
                0 => 8,
                1 => 3,
                _ => 1,
            };
            for n in 0..burst {
                let id = if i == 1 && n % 2 == 1 { request_id } else { request_id + 1 };
                request_id = request_id.max(id);

                match gate.admit(client, id) {
                    Verdict::Accepted => accepted += 1,
                    Verdict::Duplicate => {
                        duplicate += 1;
                        debug!(client, id, "duplicate request dropped");
                    }
                    Verdict::Throttled => {
                        throttled += 1;
                        debug!(client, id, "over the per-window limit");
                    }
                }
            }
        }

        if tick % 5 == 4 {
            let swept = gate.per_client.clean_up();
            info!(
                tick,
                window = gate.per_client.current_window(),
                live_counters = gate.per_client.cache_size(),
                swept,
                tracked_ids = gate.recent.len(),
                "periodic clean-up"
            );
        }
        clock.advance(Duration::from_millis(250));
    }

    let stats = gate.per_client.cache_stats();
    info!(
        accepted,
        duplicate,
        throttled,
        hit_rate = stats.hit_rate(),
        evictions = stats.eviction_count,
        "done"
    );
    if throttled == 0 {
        warn!("no request was throttled; the limit may be too generous for this traffic");
    }
    Ok(())
}
