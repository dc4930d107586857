use std::time::Duration;

/// Exponential full-jitter backoff (§4.6: "base >= 1s, cap >= 60s").
/// `next()` advances the internal attempt counter; `reset()` is called
/// once the connection reaches `ready`.
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Full jitter: `random(0, min(cap, base * 2^attempt))`. A server-
    /// provided delay (from a rate-limit-driven reconnect) always wins
    /// over the computed value, per §4.6.
    pub fn next(&mut self, server_delay: Option<Duration>) -> Duration {
        if let Some(delay) = server_delay {
            self.attempt = self.attempt.saturating_add(1);
            return delay;
        }

        let exp = self.base.saturating_mul(1u32 << self.attempt.min(20));
        let ceiling = exp.min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        random_duration_up_to(ceiling)
    }
}

fn random_duration_up_to(ceiling: Duration) -> Duration {
    let ceiling_ms = ceiling.as_millis().max(1) as u64;
    let mut buf = [0u8; 8];
    if getrandom::getrandom(&mut buf).is_err() {
        return ceiling;
    }
    let roll = u64::from_le_bytes(buf) % ceiling_ms;
    Duration::from_millis(roll)
}
