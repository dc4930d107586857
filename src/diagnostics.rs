//! Ring buffer of recent inbound/outbound frames with replay, as specified
//! for the Diagnostics component (§4.8). Kept in-memory behind a `Mutex`
//! rather than appended to the telemetry log sink, since `list`/`replay`
//! need random read access, not just append-only lines.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::time::now_wall_ms;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
    Replay,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiagnosticsEntry {
    pub direction: Direction,
    pub envelope_type: String,
    pub payload: Value,
    pub meta: Value,
    pub at_wall_ms: i64,
}

pub struct Diagnostics {
    enabled: bool,
    capacity: usize,
    entries: Mutex<VecDeque<DiagnosticsEntry>>,
}

impl Diagnostics {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled,
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    pub fn record(&self, direction: Direction, envelope_type: &str, payload: Value, meta: Value) {
        if !self.enabled {
            return;
        }
        let entry = DiagnosticsEntry {
            direction,
            envelope_type: envelope_type.to_string(),
            payload,
            meta,
            at_wall_ms: now_wall_ms(),
        };
        let mut entries = self.entries.lock().expect("diagnostics lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn list(&self, limit: Option<usize>) -> Vec<DiagnosticsEntry> {
        let entries = self.entries.lock().expect("diagnostics lock poisoned");
        match limit {
            Some(n) => entries.iter().rev().take(n).rev().cloned().collect(),
            None => entries.iter().cloned().collect(),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().expect("diagnostics lock poisoned").clear();
    }

    pub fn dump_to_path(&self, path: &Path) -> std::io::Result<()> {
        let entries = self.list(None);
        let body = serde_json::to_vec_pretty(&entries).unwrap_or_default();
        atomic_write_file(path, &body)
    }

    /// Replays captured entries through `dispatch`, re-feeding the
    /// `(envelope_type, payload)` pair of each matching entry exactly as it
    /// first arrived. A new diagnostics entry is recorded for each replayed
    /// frame with `direction: Replay`, so replay is itself observable.
    pub fn replay<F>(&self, filter: Option<Direction>, mut dispatch: F) -> usize
    where
        F: FnMut(&str, &Value),
    {
        let snapshot = self.list(None);
        let mut count = 0;
        for entry in snapshot {
            if let Some(wanted) = filter {
                if entry.direction != wanted {
                    continue;
                }
            }
            dispatch(&entry.envelope_type, &entry.payload);
            self.record(
                Direction::Replay,
                &entry.envelope_type,
                entry.payload.clone(),
                entry.meta.clone(),
            );
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ring_buffer_evicts_fifo_beyond_capacity() {
        let diagnostics = Diagnostics::new(true, 2);
        diagnostics.record(Direction::Inbound, "events_api", json!({"n": 1}), json!({}));
        diagnostics.record(Direction::Inbound, "events_api", json!({"n": 2}), json!({}));
        diagnostics.record(Direction::Inbound, "events_api", json!({"n": 3}), json!({}));

        let entries = diagnostics.list(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].payload, json!({"n": 2}));
        assert_eq!(entries[1].payload, json!({"n": 3}));
    }

    #[test]
    fn disabled_diagnostics_records_nothing() {
        let diagnostics = Diagnostics::new(false, 10);
        diagnostics.record(Direction::Inbound, "hello", json!({}), json!({}));
        assert!(diagnostics.list(None).is_empty());
    }

    #[test]
    fn replay_reinvokes_dispatch_and_marks_direction_replay() {
        let diagnostics = Diagnostics::new(true, 10);
        diagnostics.record(
            Direction::Inbound,
            "events_api",
            json!({"text": "hi"}),
            json!({"envelope_id": "e1"}),
        );

        let mut seen = Vec::new();
        let replayed = diagnostics.replay(Some(Direction::Inbound), |t, p| {
            seen.push((t.to_string(), p.clone()));
        });

        assert_eq!(replayed, 1);
        assert_eq!(seen, vec![("events_api".to_string(), json!({"text": "hi"}))]);

        let entries = diagnostics.list(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].direction, Direction::Replay);
    }
}
