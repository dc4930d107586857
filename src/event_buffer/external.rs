use super::{EventBufferAdapter, EventBufferError, RecordOutcome};
use redis::Commands;
use serde_json::Value;
use std::time::Duration;

/// Redis-backed adapter for multi-process deployments (§4.2, "external
/// adapter"). Reuses the same synchronous client model the rest of the
/// crate uses for HTTP and WebSocket I/O: one blocking connection, no
/// async runtime.
///
/// Layout per namespace:
///   - `{namespace}:k:{key}` — the recorded payload, with a Redis TTL.
///   - `{namespace}:pending` — a sorted set of keys scored by insertion
///     time, so `pending()` can return first-seen order without a second
///     round trip per key.
pub struct RedisEventBuffer {
    client: redis::Client,
    /// The instance's configured `event_buffer_adapter.ttl_ms` (§3
    /// EventBufferEntry). `pending()` has no per-call TTL to thread
    /// through the adapter trait the way `record()` does, so this is
    /// carried on the adapter itself, mirroring how `InMemoryEventBuffer`
    /// carries its own entries' TTL.
    ttl: Duration,
    /// Floor for the `pending` sorted-set prune window: entries are only
    /// removed from the index after this long, even if their own TTL was
    /// shorter, to tolerate clock drift between the value TTL and the
    /// index score.
    prune_floor: Duration,
}

impl RedisEventBuffer {
    pub fn connect(url: &str, ttl: Duration) -> Result<Self, EventBufferError> {
        let client = redis::Client::open(url).map_err(|e| EventBufferError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            ttl,
            prune_floor: Duration::from_secs(600),
        })
    }

    fn connection(&self) -> Result<redis::Connection, EventBufferError> {
        self.client
            .get_connection()
            .map_err(|e| EventBufferError::Backend(e.to_string()))
    }

    fn value_key(namespace: &str, key: &str) -> String {
        format!("{namespace}:k:{key}")
    }

    fn pending_key(namespace: &str) -> String {
        format!("{namespace}:pending")
    }

    fn prune_window_ms(&self, ttl: Duration) -> i64 {
        ttl.max(self.prune_floor).as_millis() as i64
    }

    fn now_score() -> Result<f64, EventBufferError> {
        Ok(chrono::Utc::now().timestamp_millis() as f64)
    }

    fn try_record(
        &self,
        namespace: &str,
        key: &str,
        payload: &Value,
        ttl: Duration,
    ) -> Result<RecordOutcome, EventBufferError> {
        let mut conn = self.connection()?;
        let value_key = Self::value_key(namespace, key);
        let body = serde_json::to_string(payload).map_err(|e| EventBufferError::Backend(e.to_string()))?;
        let ttl_ms = ttl.as_millis().max(1) as usize;

        let set: bool = redis::cmd("SET")
            .arg(&value_key)
            .arg(&body)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query(&mut conn)
            .map(|reply: Option<String>| reply.is_some())
            .map_err(|e| EventBufferError::Backend(e.to_string()))?;

        let score = Self::now_score()?;
        let pending_key = Self::pending_key(namespace);

        if set {
            let _: () = conn
                .zadd(&pending_key, &value_key, score)
                .map_err(|e| EventBufferError::Backend(e.to_string()))?;
            self.prune(&mut conn, namespace, ttl)?;
            Ok(RecordOutcome::Ok)
        } else {
            // Duplicate: refresh the TTL but keep the original pending
            // score so first-write-wins ordering survives the refresh.
            let _: () = conn
                .pexpire(&value_key, ttl_ms as i64)
                .map_err(|e| EventBufferError::Backend(e.to_string()))?;
            Ok(RecordOutcome::Duplicate)
        }
    }

    fn prune(
        &self,
        conn: &mut redis::Connection,
        namespace: &str,
        ttl: Duration,
    ) -> Result<(), EventBufferError> {
        let threshold = Self::now_score()? - self.prune_window_ms(ttl) as f64;
        let pending_key = Self::pending_key(namespace);
        let _: () = conn
            .zrembyscore(&pending_key, f64::NEG_INFINITY, threshold)
            .map_err(|e| EventBufferError::Backend(e.to_string()))?;
        Ok(())
    }
}

impl EventBufferAdapter for RedisEventBuffer {
    fn record(&self, namespace: &str, key: &str, payload: Value, ttl: Duration) -> RecordOutcome {
        match self.try_record(namespace, key, &payload, ttl) {
            Ok(outcome) => outcome,
            // A backend outage must not wedge the pipeline; treat it like
            // a fresh event rather than silently dropping it.
            Err(_) => RecordOutcome::Ok,
        }
    }

    fn delete(&self, namespace: &str, key: &str) {
        if let Ok(mut conn) = self.connection() {
            let value_key = Self::value_key(namespace, key);
            let _: Result<(), _> = conn.del(&value_key);
            let _: Result<(), _> = conn.zrem(Self::pending_key(namespace), &value_key);
        }
    }

    fn seen(&self, namespace: &str, key: &str) -> bool {
        match self.connection() {
            Ok(mut conn) => conn
                .exists(Self::value_key(namespace, key))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn pending(&self, namespace: &str) -> Vec<Value> {
        let mut conn = match self.connection() {
            Ok(conn) => conn,
            Err(_) => return Vec::new(),
        };
        let pending_key = Self::pending_key(namespace);
        let _ = self.prune(&mut conn, namespace, self.ttl);

        let keys: Vec<String> = conn.zrange(&pending_key, 0, -1).unwrap_or_default();
        let mut out = Vec::with_capacity(keys.len());
        for value_key in keys {
            if let Ok(Some(body)) = conn.get::<_, Option<String>>(&value_key) {
                if let Ok(value) = serde_json::from_str(&body) {
                    out.push(value);
                }
            }
        }
        out
    }
}
