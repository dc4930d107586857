//! Bot identity resolution (§4.3 sync worker step 1: "Acquires bot
//! identity (`user_id`) from config or via `auth.test`"). Resolved once
//! at startup and shared by the cache event filter and (indirectly) the
//! sync workers, rather than re-resolved on every pager sweep.

use crate::config::ConfigError;
use crate::web_api::{TokenKind, WebApiClient};
use serde_json::json;

/// Returns `configured` verbatim when set and non-blank; otherwise calls
/// `auth.test` with the bot token and extracts `user_id`.
pub fn resolve_bot_user_id(web_api: &WebApiClient, configured: Option<&str>) -> Result<String, ConfigError> {
    if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    let response = web_api
        .push("auth.test", json!({}), TokenKind::Bot)
        .map_err(|err| ConfigError::Invalid(format!("auth.test failed while resolving bot identity: {err}")))?;
    response
        .get("user_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Invalid("auth.test response missing user_id".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiter;
    use crate::telemetry::NullTelemetry;
    use crate::web_api::transport::{HttpTransport, RawResponse, TransportError};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    struct StubTransport {
        responses: Mutex<Vec<Result<RawResponse, TransportError>>>,
    }

    impl HttpTransport for StubTransport {
        fn post(&self, _method: &str, _token: &str, _body: &Value) -> Result<RawResponse, TransportError> {
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn client_with(responses: Vec<Result<RawResponse, TransportError>>) -> WebApiClient {
        let telemetry = Arc::new(NullTelemetry);
        let transport: Arc<dyn HttpTransport> = Arc::new(StubTransport {
            responses: Mutex::new(responses),
        });
        let rate_limiter = Arc::new(RateLimiter::new(telemetry.clone()));
        WebApiClient::new(transport, rate_limiter, telemetry, "xoxb-1".into(), "xapp-1".into(), 1)
    }

    #[test]
    fn configured_id_short_circuits_auth_test() {
        let client = client_with(vec![]);
        let id = resolve_bot_user_id(&client, Some("UCONFIGURED")).expect("resolved");
        assert_eq!(id, "UCONFIGURED");
    }

    #[test]
    fn blank_configured_id_falls_back_to_auth_test() {
        let client = client_with(vec![Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: json!({"ok": true, "user_id": "UBOT"}),
        })]);
        let id = resolve_bot_user_id(&client, Some("  ")).expect("resolved");
        assert_eq!(id, "UBOT");
    }

    #[test]
    fn missing_user_id_in_response_is_an_error() {
        let client = client_with(vec![Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: json!({"ok": true}),
        })]);
        assert!(resolve_bot_user_id(&client, None).is_err());
    }
}
