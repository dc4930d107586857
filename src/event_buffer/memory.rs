use super::{EventBufferAdapter, RecordOutcome};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    payload: Value,
    expires_at: Instant,
    /// Monotonically increasing sequence assigned at first insertion, used
    /// to keep `pending` deterministic regardless of `HashMap` iteration
    /// order (§4.2 invariant 5).
    order: u64,
}

#[derive(Default)]
struct Namespace {
    entries: HashMap<String, Entry>,
    /// Insertion order of keys, oldest first. A key may appear once;
    /// duplicates refresh the existing entry's `expires_at` without
    /// touching this queue, so `pending` order reflects first-seen order.
    order: VecDeque<String>,
    next_seq: u64,
}

/// Single-process dedupe store (§4.2, "in-memory adapter"). One
/// `Mutex<HashMap>` per buffer instance gives the required atomic
/// set-if-absent: whichever of N concurrent `record` calls on the same key
/// acquires the lock first observes the entry absent and wins.
#[derive(Default)]
pub struct InMemoryEventBuffer {
    namespaces: Mutex<HashMap<String, Namespace>>,
}

impl InMemoryEventBuffer {
    fn with_namespace<T>(&self, namespace: &str, f: impl FnOnce(&mut Namespace) -> T) -> T {
        let mut guard = self.namespaces.lock().expect("event buffer lock poisoned");
        let ns = guard.entry(namespace.to_string()).or_default();
        f(ns)
    }

    fn prune_expired(ns: &mut Namespace, now: Instant) {
        while let Some(front) = ns.order.front() {
            match ns.entries.get(front) {
                Some(entry) if entry.expires_at <= now => {
                    let key = ns.order.pop_front().expect("front checked above");
                    ns.entries.remove(&key);
                }
                _ => break,
            }
        }
        // Entries can also expire out of FIFO order if a later insertion
        // carried a shorter effective TTL; sweep the remainder too.
        let expired: Vec<String> = ns
            .entries
            .iter()
            .filter(|(_, e)| e.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            ns.entries.remove(&key);
            ns.order.retain(|k| k != &key);
        }
    }
}

impl EventBufferAdapter for InMemoryEventBuffer {
    fn record(&self, namespace: &str, key: &str, payload: Value, ttl: Duration) -> RecordOutcome {
        let now = Instant::now();
        self.with_namespace(namespace, |ns| {
            Self::prune_expired(ns, now);
            if let Some(existing) = ns.entries.get_mut(key) {
                existing.expires_at = now + ttl;
                return RecordOutcome::Duplicate;
            }
            let seq = ns.next_seq;
            ns.next_seq += 1;
            ns.entries.insert(
                key.to_string(),
                Entry {
                    payload,
                    expires_at: now + ttl,
                    order: seq,
                },
            );
            ns.order.push_back(key.to_string());
            RecordOutcome::Ok
        })
    }

    fn delete(&self, namespace: &str, key: &str) {
        self.with_namespace(namespace, |ns| {
            ns.entries.remove(key);
            ns.order.retain(|k| k != key);
        });
    }

    fn seen(&self, namespace: &str, key: &str) -> bool {
        let now = Instant::now();
        self.with_namespace(namespace, |ns| {
            Self::prune_expired(ns, now);
            ns.entries.contains_key(key)
        })
    }

    fn pending(&self, namespace: &str) -> Vec<Value> {
        let now = Instant::now();
        self.with_namespace(namespace, |ns| {
            Self::prune_expired(ns, now);
            let mut items: Vec<(u64, Value)> = ns
                .entries
                .values()
                .map(|e| (e.order, e.payload.clone()))
                .collect();
            items.sort_by_key(|(order, _)| *order);
            items.into_iter().map(|(_, payload)| payload).collect()
        })
    }
}
