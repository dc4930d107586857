use serde_json::Value;

/// Identifies the serialization domain a Web API call falls into (§3
/// RateLimitKey). Known chat methods key on `(method_family, channel_id)`
/// so two posts to different channels never block each other; everything
/// else keys on the whole workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    Channel { family: &'static str, channel_id: String },
    Workspace,
}

const CHAT_METHOD_FAMILIES: &[(&str, &str)] = &[
    ("chat.postMessage", "chat"),
    ("chat.update", "chat"),
    ("chat.delete", "chat"),
    ("chat.scheduleMessage", "chat"),
    ("chat.postEphemeral", "chat"),
];

/// §3: "derived from method+body". `body` is consulted only for the
/// channel id; methods outside the known chat family always resolve to
/// `Workspace` regardless of body shape.
pub fn derive_rate_limit_key(method: &str, body: &Value) -> RateLimitKey {
    let family = CHAT_METHOD_FAMILIES
        .iter()
        .find(|(m, _)| *m == method)
        .map(|(_, family)| *family);

    match family {
        Some(family) => {
            let channel_id = body
                .get("channel")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            RateLimitKey::Channel { family, channel_id }
        }
        None => RateLimitKey::Workspace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_methods_key_on_channel() {
        let key = derive_rate_limit_key("chat.postMessage", &json!({"channel": "C1"}));
        assert_eq!(
            key,
            RateLimitKey::Channel {
                family: "chat",
                channel_id: "C1".to_string()
            }
        );
    }

    #[test]
    fn unknown_methods_key_on_workspace() {
        let key = derive_rate_limit_key("conversations.list", &json!({}));
        assert_eq!(key, RateLimitKey::Workspace);
    }

    #[test]
    fn distinct_channels_yield_distinct_keys() {
        let a = derive_rate_limit_key("chat.postMessage", &json!({"channel": "C1"}));
        let b = derive_rate_limit_key("chat.postMessage", &json!({"channel": "C2"}));
        assert_ne!(a, b);
    }
}
