//! Dual rate limiter (§4.4): per-key serialization composed in front of a
//! tier-based token bucket, both 429-aware. Composition order is always
//! Limiter-A, then Limiter-B, then the HTTP call.

pub mod key;
pub mod limiter_a;
pub mod limiter_b;
pub mod tiers;

use crate::telemetry::{Event, Telemetry};
use key::RateLimitKey;
use limiter_a::{KeyGuard, LimiterA};
use limiter_b::LimiterB;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiers::Tier;

#[derive(Debug, thiserror::Error)]
pub enum RateLimiterError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
}

/// Held by the caller for the duration of one outbound request. Dropping
/// it releases Limiter-A's per-key lock to the next FIFO waiter.
pub struct Permit<'a> {
    _key_guard: KeyGuard<'a>,
}

pub struct RateLimiter {
    limiter_a: LimiterA,
    limiter_b: LimiterB,
    telemetry: Arc<dyn Telemetry>,
}

impl RateLimiter {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            limiter_a: LimiterA::new(),
            limiter_b: LimiterB::new(),
            telemetry,
        }
    }

    /// Blocks until both limiters admit the request, in the order mandated
    /// by §4.4. The returned `Permit` must be held until the HTTP call
    /// completes so Limiter-A's at-most-one-in-flight invariant holds for
    /// the request's full duration, not just its admission.
    pub fn acquire(&self, key: &RateLimitKey, tier: Tier) -> Permit<'_> {
        self.telemetry.emit(
            Event::new("rate_limiter", "decision")
                .with_metadata("key", format!("{key:?}"))
                .with_metadata("decision", "allow"),
        );
        let key_guard = self.limiter_a.acquire(key);

        self.telemetry.emit(
            Event::new("tier_limiter", "decision")
                .with_metadata("tier", format!("{tier:?}"))
                .with_metadata("decision", "allow"),
        );
        self.limiter_b.acquire(tier);

        Permit {
            _key_guard: key_guard,
        }
    }

    /// Called by the Web API client when a response carries HTTP 429
    /// (§4.4: "the limiter itself does NOT retry application-level 429s;
    /// it records the suspension and returns rate_limited to the caller").
    pub fn record_rate_limited(&self, key: &RateLimitKey, tier: Tier, retry_after: Duration) {
        let until = Instant::now() + retry_after;
        self.limiter_a.suspend(key, until);
        self.limiter_b.suspend(tier, until);
        self.telemetry.emit(
            Event::new("tier_limiter", "decision")
                .with_metadata("tier", format!("{tier:?}"))
                .with_metadata("decision", "suspend")
                .with_measurement("retry_after_seconds", retry_after.as_secs() as i64),
        );
    }
}
