//! TTL-bounded dedupe store for inbound envelope IDs (§3 EventBufferEntry,
//! §4.2). Two adapters share one contract: first-write-wins, TTL refreshed
//! on duplicate, deterministic insertion-ordered `pending`, nil-key
//! tolerance, and namespace isolation by instance name.

pub mod external;
pub mod memory;

use crate::shared::ids::InstanceName;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EventBufferError {
    #[error("external event buffer backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Ok,
    Duplicate,
}

/// Adapter contract from §4.2. Implementors decide their own internal
/// concurrency but must provide atomic "set-if-absent" semantics: N
/// concurrent `record` calls on the same key must yield exactly one `Ok`.
pub trait EventBufferAdapter: Send + Sync {
    fn record(&self, namespace: &str, key: &str, payload: Value, ttl: Duration) -> RecordOutcome;
    fn delete(&self, namespace: &str, key: &str);
    fn seen(&self, namespace: &str, key: &str) -> bool;
    /// Entries in the order they were first recorded, excluding expired or
    /// deleted ones.
    fn pending(&self, namespace: &str) -> Vec<Value>;
}

/// Facade wrapping an adapter with the instance's namespace and nil-key
/// tolerance, so callers never have to special-case either.
pub struct EventBuffer {
    namespace: InstanceName,
    ttl: Duration,
    adapter: Arc<dyn EventBufferAdapter>,
}

impl EventBuffer {
    pub fn new(namespace: InstanceName, ttl: Duration, adapter: Arc<dyn EventBufferAdapter>) -> Self {
        Self {
            namespace,
            ttl,
            adapter,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `record(None, _)` always reports `Ok` but marks nothing as seen
    /// (§4.2 invariant 1, "nil key tolerance") - callers use this for
    /// system frames without an `envelope_id`.
    pub fn record(&self, key: Option<&str>, payload: Value) -> RecordOutcome {
        match key {
            Some(key) => self
                .adapter
                .record(self.namespace.as_str(), key, payload, self.ttl),
            None => RecordOutcome::Ok,
        }
    }

    pub fn delete(&self, key: Option<&str>) {
        if let Some(key) = key {
            self.adapter.delete(self.namespace.as_str(), key);
        }
    }

    pub fn seen(&self, key: Option<&str>) -> bool {
        match key {
            Some(key) => self.adapter.seen(self.namespace.as_str(), key),
            None => false,
        }
    }

    pub fn pending(&self) -> Vec<Value> {
        self.adapter.pending(self.namespace.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_buffer::memory::InMemoryEventBuffer;
    use serde_json::json;

    fn buffer(ttl_ms: u64) -> EventBuffer {
        EventBuffer::new(
            InstanceName::default(),
            Duration::from_millis(ttl_ms),
            Arc::new(InMemoryEventBuffer::default()),
        )
    }

    #[test]
    fn nil_key_never_marks_seen() {
        let buffer = buffer(1_000);
        assert_eq!(buffer.record(None, json!({})), RecordOutcome::Ok);
        assert!(!buffer.seen(None));
        buffer.delete(None);
    }

    #[test]
    fn first_write_wins_and_pending_keeps_first_payload() {
        let buffer = buffer(1_000);
        assert_eq!(buffer.record(Some("e1"), json!({"v": 1})), RecordOutcome::Ok);
        assert_eq!(
            buffer.record(Some("e1"), json!({"v": 2})),
            RecordOutcome::Duplicate
        );
        assert_eq!(buffer.pending(), vec![json!({"v": 1})]);
    }
}
