use crate::config::AckModeSetting;
use serde_json::{json, Value};
use std::fmt;

/// The automatic response body sent for a slash command before the
/// handler chain runs (§4.7 step 6, GLOSSARY "Auto-ack"). `Custom` can
/// only be constructed programmatically by the `Instance` builder, since
/// `AckModeSetting` (the YAML-serializable half) has no function variant.
pub enum AckStrategy {
    Silent,
    Ephemeral,
    Custom(Box<dyn Fn(&Value) -> Value + Send + Sync>),
}

impl fmt::Debug for AckStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckStrategy::Silent => write!(f, "AckStrategy::Silent"),
            AckStrategy::Ephemeral => write!(f, "AckStrategy::Ephemeral"),
            AckStrategy::Custom(_) => write!(f, "AckStrategy::Custom(..)"),
        }
    }
}

impl From<AckModeSetting> for AckStrategy {
    fn from(setting: AckModeSetting) -> Self {
        match setting {
            AckModeSetting::Silent => AckStrategy::Silent,
            AckModeSetting::Ephemeral => AckStrategy::Ephemeral,
        }
    }
}

impl AckStrategy {
    /// Returns the WS ack body to send, if any, for a slash command
    /// envelope. `Ephemeral` without a custom body defaults to
    /// `{"text": "Processing..."}` per S1.
    pub fn ack_body(&self, payload: &Value) -> Option<Value> {
        match self {
            AckStrategy::Silent => None,
            AckStrategy::Ephemeral => Some(json!({"text": "Processing..."})),
            AckStrategy::Custom(f) => Some(f(payload)),
        }
    }
}
