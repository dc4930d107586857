//! Web API client (§4.5): wraps the HTTP transport with both rate
//! limiters, retry-free error propagation, and telemetry.

pub mod pool;
pub mod transport;

use crate::rate_limiter::key::derive_rate_limit_key;
use crate::rate_limiter::tiers::tier_for_method;
use crate::rate_limiter::RateLimiter;
use crate::telemetry::{Event, Telemetry};
use pool::WorkerPool;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use transport::{HttpTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum WebApiError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("slack api error: {0}")]
    SlackApi(String),
    #[error("http {status} from slack")]
    Http5xx { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

impl From<TransportError> for WebApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => WebApiError::Network(msg),
            TransportError::Timeout => WebApiError::Timeout,
        }
    }
}

pub enum TokenKind {
    Bot,
    App,
}

/// The stateless, cloneable half of the client: everything `push` needs.
/// Split out from `WebApiClient` so `push_async` can hand a copy to a pool
/// worker without dragging the pool itself along.
struct Inner {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
    telemetry: Arc<dyn Telemetry>,
    bot_token: String,
    app_token: String,
}

impl Inner {
    fn token_for(&self, kind: &TokenKind) -> &str {
        match kind {
            TokenKind::Bot => &self.bot_token,
            TokenKind::App => &self.app_token,
        }
    }

    fn push(&self, method: &str, body: Value, token: TokenKind) -> Result<Value, WebApiError> {
        let key = derive_rate_limit_key(method, &body);
        let tier = tier_for_method(method);
        let _permit = self.rate_limiter.acquire(&key, tier);

        let start = Instant::now();
        let token = self.token_for(&token).to_string();
        let result = self.transport.post(method, &token, &body);
        let duration = start.elapsed();

        match result {
            Ok(raw) if raw.status == 429 => {
                let retry_after = raw.retry_after.unwrap_or(Duration::from_secs(1));
                self.rate_limiter.record_rate_limited(&key, tier, retry_after);
                self.telemetry.emit(
                    Event::new("api", "rate_limited")
                        .with_metadata("method", method.to_string())
                        .with_measurement("retry_after_seconds", retry_after.as_secs() as i64),
                );
                self.emit_request(method, duration, "error");
                Err(WebApiError::RateLimited { retry_after })
            }
            Ok(raw) if raw.status >= 500 => {
                self.emit_request(method, duration, "error");
                Err(WebApiError::Http5xx { status: raw.status })
            }
            Ok(raw) => {
                let ok = raw.body.get("ok").and_then(Value::as_bool).unwrap_or(false);
                if ok {
                    self.emit_request(method, duration, "ok");
                    Ok(raw.body)
                } else {
                    let error = raw
                        .body
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown_error")
                        .to_string();
                    self.emit_request(method, duration, "error");
                    Err(WebApiError::SlackApi(error))
                }
            }
            Err(transport_error) => {
                self.emit_request(method, duration, "exception");
                Err(transport_error.into())
            }
        }
    }

    fn emit_request(&self, method: &str, duration: Duration, status: &str) {
        self.telemetry.emit(
            Event::new("api", "request")
                .with_metadata("method", method.to_string())
                .with_metadata("status", status.to_string())
                .with_measurement("duration_ms", duration.as_millis() as i64),
        );
    }
}

pub struct WebApiClient {
    inner: Arc<Inner>,
    pool: WorkerPool,
}

impl WebApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        rate_limiter: Arc<RateLimiter>,
        telemetry: Arc<dyn Telemetry>,
        bot_token: String,
        app_token: String,
        pool_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                rate_limiter,
                telemetry,
                bot_token,
                app_token,
            }),
            pool: WorkerPool::new(pool_size),
        }
    }

    /// Blocking call through both limiters (§4.5). Emits
    /// `[telemetry_prefix, api, request]` with `{duration, method, status}`
    /// on every outcome; on `429` additionally suspends the limiter keys
    /// and emits `[api, rate_limited]`.
    pub fn push(&self, method: &str, body: Value, token: TokenKind) -> Result<Value, WebApiError> {
        self.inner.push(method, body, token)
    }

    /// Schedules `push` on the supervised worker pool (§4.5). §7: "push_async
    /// logs and drops" - the result never reaches a caller, only telemetry.
    pub fn push_async(&self, method: &'static str, body: Value, token: TokenKind) {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(move || {
            if let Err(err) = inner.push(method, body, token) {
                inner.telemetry.emit(
                    Event::new("api", "request")
                        .with_metadata("method", method.to_string())
                        .with_metadata("status", "async_error")
                        .with_metadata("error", err.to_string()),
                );
            }
        });
    }
}
