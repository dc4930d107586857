//! S4: a `disconnect` frame with `reason: "refresh"` drives the manager
//! through disconnect -> backoff -> reopen -> connected -> ready again,
//! against a real (loopback) WebSocket server so the state machine is
//! exercised end to end rather than through its internal helpers.

use serde_json::{json, Value};
use slack_socket_core::connection::{ConnectionManager, EnvelopeSink};
use slack_socket_core::envelope::Envelope;
use slack_socket_core::rate_limiter::RateLimiter;
use slack_socket_core::telemetry::RecordingTelemetry;
use slack_socket_core::web_api::transport::{HttpTransport, RawResponse, TransportError};
use slack_socket_core::web_api::WebApiClient;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tungstenite::Message;

struct NoopSink;
impl EnvelopeSink for NoopSink {
    fn accept(&self, _envelope: Envelope) {}
}

struct OpenUrlTransport {
    url: String,
}

impl HttpTransport for OpenUrlTransport {
    fn post(&self, method: &str, _token: &str, _body: &Value) -> Result<RawResponse, TransportError> {
        assert_eq!(method, "apps.connections.open");
        Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: json!({"ok": true, "url": self.url}),
        })
    }
}

/// A bare-bones Socket Mode peer: on each accepted connection it sends
/// `hello`, then shortly after a `disconnect` frame with `reason: "refresh"`,
/// then closes - forcing the client to reopen and repeat the cycle.
fn spawn_mock_socket_server(listener: TcpListener) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let Ok(mut ws) = tungstenite::accept(stream) else {
                continue;
            };
            let _ = ws.send(Message::Text(json!({"type": "hello"}).to_string()));
            thread::sleep(Duration::from_millis(50));
            let _ = ws.send(Message::Text(
                json!({"type": "disconnect", "reason": "refresh"}).to_string(),
            ));
            thread::sleep(Duration::from_millis(50));
            let _ = ws.close(None);
        }
    });
}

#[test]
fn refresh_disconnect_reconnects_and_reaches_ready_again() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().expect("local addr").port();
    spawn_mock_socket_server(listener);

    let telemetry = Arc::new(RecordingTelemetry::new());
    let transport: Arc<dyn HttpTransport> = Arc::new(OpenUrlTransport {
        url: format!("ws://127.0.0.1:{port}"),
    });
    let rate_limiter = Arc::new(RateLimiter::new(telemetry.clone()));
    let web_api = Arc::new(WebApiClient::new(
        transport,
        rate_limiter,
        telemetry.clone(),
        "xoxb-1".into(),
        "xapp-1".into(),
        1,
    ));
    let manager = Arc::new(ConnectionManager::new(
        web_api,
        telemetry.clone(),
        Arc::new(NoopSink),
        Duration::from_secs(5),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let run_manager = Arc::clone(&manager);
    let run_stop = Arc::clone(&stop);
    let handle = thread::spawn(move || {
        let _ = run_manager.run_until_stop(&run_stop);
    });

    let ready_count = |telemetry: &RecordingTelemetry| {
        telemetry
            .events()
            .iter()
            .filter(|e| e.prefix == "connection" && e.name == "state")
            .filter(|e| e.metadata.get("state") == Some(&json!("ready")))
            .count()
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while ready_count(&telemetry) < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }

    stop.store(true, Ordering::Relaxed);
    handle.join().expect("connection manager thread");

    let states: Vec<String> = telemetry
        .events()
        .iter()
        .filter(|e| e.prefix == "connection" && e.name == "state")
        .filter_map(|e| e.metadata.get("state").and_then(Value::as_str).map(str::to_string))
        .collect();

    assert!(ready_count(&telemetry) >= 2, "expected at least two ready states, got {states:?}");
    let first_ready = states.iter().position(|s| s == "ready").expect("first ready");
    assert!(
        states[first_ready..].iter().any(|s| s == "disconnected"),
        "expected a disconnected state after the first ready, got {states:?}"
    );
    assert_eq!(telemetry.count("connection", "rate_limited"), 0);
}
