use std::time::Instant;

/// Wall-clock milliseconds since epoch, used only for diagnostics/telemetry
/// timestamps. Never used for TTL or ordering math - those use `Instant`.
pub fn now_wall_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A process-local monotonic clock. All TTL and backoff math in this crate
/// is expressed in terms of `Instant`, never wall-clock time, so NTP
/// adjustments can't shorten or extend a dedupe window or a suspension.
pub fn monotonic_now() -> Instant {
    Instant::now()
}
