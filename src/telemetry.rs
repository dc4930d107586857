//! Structured event emission, grounded on the same JSON-lines-to-sink idiom
//! used for runtime logging: every subsystem reports through a small
//! `measurements`/`metadata` shape rather than free-text log lines, so tests
//! can assert on emitted events instead of grepping formatted strings.

use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::shared::time::now_wall_ms;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub prefix: &'static str,
    pub name: &'static str,
    pub measurements: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub at_wall_ms: i64,
    /// The configurable `telemetry_prefix` (§6: "prefix configurable"),
    /// prepended ahead of `prefix`/`name` to form the documented
    /// `[telemetry_prefix, api, request]`-style event name. Set by
    /// [`NamespacedTelemetry`], not by call sites - individual `emit`
    /// callers only ever know their own subsystem/event pair.
    pub namespace: Option<String>,
}

impl Event {
    pub fn new(prefix: &'static str, name: &'static str) -> Self {
        Self {
            prefix,
            name,
            measurements: Map::new(),
            metadata: Map::new(),
            at_wall_ms: now_wall_ms(),
            namespace: None,
        }
    }

    pub fn with_measurement(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.measurements.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) if !namespace.is_empty() => {
                format!("[{namespace}, {}, {}]", self.prefix, self.name)
            }
            _ => format!("[{}, {}]", self.prefix, self.name),
        }
    }
}

/// Emits telemetry events. Implementations must not block the socket loop;
/// the default file sink appends and never blocks on I/O errors (they are
/// swallowed, matching `append_runtime_log`'s fire-and-forget discipline).
pub trait Telemetry: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink: appends one JSON object per line, mirroring
/// `runtime::logging::append_runtime_log`'s `{timestamp, level, event,
/// message}` shape, generalized to carry measurements/metadata maps.
pub struct JsonFileTelemetry {
    path: PathBuf,
}

impl JsonFileTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Telemetry for JsonFileTelemetry {
    fn emit(&self, event: Event) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let payload = serde_json::json!({
            "at_wall_ms": event.at_wall_ms,
            "event": event.qualified_name(),
            "measurements": event.measurements,
            "metadata": event.metadata,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };
        let _ = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(format!("{line}\n").as_bytes()));
    }
}

pub fn default_telemetry_path(state_root: &Path) -> PathBuf {
    state_root.join("telemetry.jsonl")
}

/// Drops every event. Used when `diagnostics.enabled = false` and by tests
/// that don't care about telemetry assertions.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn emit(&self, _event: Event) {}
}

/// Wraps another sink and stamps every event with the configured
/// `telemetry_prefix` (§4.1 `Config::telemetry_prefix`, §6 "prefix
/// configurable") before forwarding. `Instance::build` wraps whichever
/// inner sink it constructs (`JsonFileTelemetry` or `NullTelemetry`) in
/// one of these, so every subsystem's `Event::new(prefix, name)` call
/// picks up the namespace without threading config through every call
/// site.
pub struct NamespacedTelemetry {
    inner: Arc<dyn Telemetry>,
    namespace: String,
}

impl NamespacedTelemetry {
    pub fn new(inner: Arc<dyn Telemetry>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }
}

impl Telemetry for NamespacedTelemetry {
    fn emit(&self, mut event: Event) {
        if !self.namespace.is_empty() {
            event.namespace = Some(self.namespace.clone());
        }
        self.inner.emit(event);
    }
}

/// In-memory recording sink for tests: captures every emitted event in
/// order so scenario tests (S1-S6) can assert on exact telemetry sequences
/// without parsing a log file.
#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<Event>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("telemetry lock poisoned").clone()
    }

    pub fn count(&self, prefix: &str, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.prefix == prefix && e.name == name)
            .count()
    }
}

impl Telemetry for RecordingTelemetry {
    fn emit(&self, event: Event) {
        self.events.lock().expect("telemetry lock poisoned").push(event);
    }
}
