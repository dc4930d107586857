use serde_json::Value;
use std::time::Duration;

/// Raw transport result before rate-limit/ok-envelope interpretation.
/// Kept separate from `WebApiError` because a non-2xx-non-429 status and a
/// `{"ok": false}` body are handled at different layers (§6: "Response
/// body's top-level ok: false surfaces as {err, {slack, error_string}}").
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error calling slack: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

/// The contract the core depends on (§1: "the concrete HTTP client - only
/// its contract is used"), generalized from `SlackApiClient`'s
/// `get_with_token`/`post_json_with_token` pair into one POST-shaped call
/// since every Slack Web API method accepts a JSON POST.
pub trait HttpTransport: Send + Sync {
    fn post(&self, method: &str, token: &str, body: &Value) -> Result<RawResponse, TransportError>;
}

/// Default transport, grounded directly on the teacher's `ureq`-based
/// `SlackApiClient`: same base URL override, same bearer-token header, same
/// blocking call. Generalized to read `Retry-After` and preserve the raw
/// status instead of eagerly deserializing into a typed envelope.
pub struct UreqTransport {
    api_base: String,
    timeout: Duration,
}

const DEFAULT_API_BASE: &str = "https://slack.com/api";

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let api_base = std::env::var("SLACK_SOCKET_CORE_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self { api_base, timeout }
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), method)
    }
}

impl HttpTransport for UreqTransport {
    fn post(&self, method: &str, token: &str, body: &Value) -> Result<RawResponse, TransportError> {
        let url = self.endpoint(method);
        let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
        let response = agent
            .post(&url)
            .set("Authorization", &format!("Bearer {token}"))
            .send_json(body.clone());

        match response {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_json::<Value>()
                    .map_err(|e| TransportError::Network(e.to_string()))?;
                Ok(RawResponse {
                    status,
                    retry_after: None,
                    body,
                })
            }
            Err(ureq::Error::Status(429, response)) => {
                let retry_after = response
                    .header("Retry-After")
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                let body = response.into_json::<Value>().unwrap_or(Value::Null);
                Ok(RawResponse {
                    status: 429,
                    retry_after,
                    body,
                })
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_json::<Value>().unwrap_or(Value::Null);
                Ok(RawResponse {
                    status,
                    retry_after: None,
                    body,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                if transport.kind() == ureq::ErrorKind::Io {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Network(transport.to_string()))
                }
            }
        }
    }
}
