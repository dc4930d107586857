use super::tiers::Tier;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as TokenBucket};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

struct TierBucket {
    bucket: TokenBucket<NotKeyed, InMemoryState, DefaultClock>,
    clock: DefaultClock,
    suspended_until: Mutex<Option<Instant>>,
}

impl TierBucket {
    fn new(quota: Quota) -> Self {
        Self {
            bucket: TokenBucket::direct(quota),
            clock: DefaultClock::default(),
            suspended_until: Mutex::new(None),
        }
    }

    fn acquire(&self) {
        loop {
            let remaining = {
                let mut guard = self.suspended_until.lock().expect("tier lock poisoned");
                match *guard {
                    Some(until) if until > Instant::now() => Some(until - Instant::now()),
                    Some(_) => {
                        *guard = None;
                        None
                    }
                    None => None,
                }
            };
            if let Some(remaining) = remaining {
                std::thread::sleep(remaining);
                continue;
            }

            match self.bucket.check() {
                Ok(()) => return,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(self.clock.now());
                    std::thread::sleep(wait);
                }
            }
        }
    }

    fn suspend(&self, until: Instant) {
        *self.suspended_until.lock().expect("tier lock poisoned") = Some(until);
    }
}

/// Tier-based token bucket (§4.4 Limiter-B). Every documented Slack method
/// maps to one of a small set of tiers; each tier owns its own bucket so a
/// burst against one tier never starves another.
pub struct LimiterB {
    tiers: HashMap<Tier, TierBucket>,
}

impl Default for LimiterB {
    fn default() -> Self {
        let mut tiers = HashMap::new();
        for tier in [
            Tier::Tier1,
            Tier::Tier2,
            Tier::Tier3,
            Tier::Tier4,
            Tier::ChatPostMessage,
        ] {
            tiers.insert(tier, TierBucket::new(tier.quota()));
        }
        Self { tiers }
    }
}

impl LimiterB {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until a token is available for `tier` and the tier is not
    /// suspended.
    pub fn acquire(&self, tier: Tier) {
        if let Some(bucket) = self.tiers.get(&tier) {
            bucket.acquire();
        }
    }

    /// §4.4: "on 429 the tier enters a suspended state until Retry-After
    /// elapses".
    pub fn suspend(&self, tier: Tier, until: Instant) {
        if let Some(bucket) = self.tiers.get(&tier) {
            bucket.suspend(until);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn suspended_tier_blocks_until_elapsed() {
        let limiter = LimiterB::new();
        limiter.suspend(Tier::Tier1, Instant::now() + Duration::from_millis(30));
        let start = Instant::now();
        limiter.acquire(Tier::Tier1);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn distinct_tiers_are_independent() {
        let limiter = LimiterB::new();
        limiter.suspend(Tier::Tier1, Instant::now() + Duration::from_secs(5));
        let start = Instant::now();
        limiter.acquire(Tier::Tier4);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
