use serde_json::{Map, Value};

/// Per-dispatch scratch space threaded through the middleware chain and
/// into handlers (§3 Config.assigns, generalized to a per-request bag
/// rather than a config-wide one). Each middleware may add or overwrite
/// entries; handlers only ever read.
#[derive(Debug, Clone, Default)]
pub struct Context {
    assigns: Map<String, Value>,
}

impl Context {
    pub fn new(assigns: Map<String, Value>) -> Self {
        Self { assigns }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.assigns.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.assigns.insert(key.into(), value.into());
    }

    pub fn assigns(&self) -> &Map<String, Value> {
        &self.assigns
    }
}
