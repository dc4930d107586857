//! Connection Manager (§4.6): the Socket Mode state machine. Generalizes
//! the teacher's non-blocking `tungstenite` read loop from a fixed polling
//! window into a long-running, stoppable loop with heartbeat detection and
//! jittered reconnect backoff.

pub mod backoff;

use crate::envelope::{Envelope, EnvelopeType, WireEnvelope};
use crate::telemetry::{Event, Telemetry};
use crate::web_api::{TokenKind, WebApiClient, WebApiError};
use backoff::Backoff;
use serde_json::json;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

const SOCKET_IDLE_SLEEP: Duration = Duration::from_millis(40);

/// Fixed reconnect delay for the documented `disconnect` frame path
/// (§4.6: "re-enters backoff with a short delay"). Does not grow with
/// repeated attempts - that growth is reserved for genuine connection
/// failures (dead socket, transport error, failed open).
const DISCONNECT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to open socket mode connection: {0}")]
    Open(#[from] WebApiError),
    #[error("websocket transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Backoff,
}

impl ConnectionState {
    fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Backoff => "backoff",
        }
    }
}

enum LoopOutcome {
    /// A `disconnect` control frame, or a clean stop request observed
    /// mid-loop. Socket Mode's disconnect frame never carries a real
    /// Retry-After, so this always reconnects after a short fixed delay
    /// rather than the exponential backoff counter (§4.6).
    Disconnect,
    Dead,
    TransportError(String),
}

/// Dispatch callback invoked off the socket thread for every non-control
/// envelope. Implemented by `pipeline::HandlerPipeline::dispatch` in the
/// full runtime; kept as a trait object here so this module has no
/// compile-time dependency on the pipeline's internals.
pub trait EnvelopeSink: Send + Sync {
    fn accept(&self, envelope: Envelope);

    /// Computed synchronously on the socket thread, before the ack frame
    /// is sent (§4.7 step 6: slash-command auto-ack). Must not perform I/O
    /// or block - the pipeline only consults its own in-memory
    /// `AckStrategy` here.
    fn ack_payload(&self, _envelope: &Envelope) -> Option<serde_json::Value> {
        None
    }
}

pub struct ConnectionManager {
    web_api: Arc<WebApiClient>,
    telemetry: Arc<dyn Telemetry>,
    sink: Arc<dyn EnvelopeSink>,
    idle_timeout: Duration,
    backoff: std::sync::Mutex<Backoff>,
}

impl ConnectionManager {
    pub fn new(
        web_api: Arc<WebApiClient>,
        telemetry: Arc<dyn Telemetry>,
        sink: Arc<dyn EnvelopeSink>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            web_api,
            telemetry,
            sink,
            idle_timeout,
            backoff: std::sync::Mutex::new(Backoff::new(Duration::from_secs(1), Duration::from_secs(60))),
        }
    }

    fn emit_state(&self, state: ConnectionState) {
        self.telemetry.emit(
            Event::new("connection", "state").with_metadata("state", state.as_str().to_string()),
        );
    }

    fn open_url(&self) -> Result<String, ConnectionError> {
        let response = self.web_api.push("apps.connections.open", json!({}), TokenKind::App)?;
        response
            .get("url")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectionError::Transport("apps.connections.open missing url".into()))
    }

    /// Runs the state machine until `stop` is set. §4.6's full transition
    /// diagram in one loop: disconnected -> connecting -> connected ->
    /// ready, backing off on any failure and looping back to connecting.
    pub fn run_until_stop(&self, stop: &AtomicBool) -> Result<(), ConnectionError> {
        self.emit_state(ConnectionState::Disconnected);

        while !stop.load(Ordering::Relaxed) {
            self.emit_state(ConnectionState::Connecting);
            let url = match self.open_url() {
                Ok(url) => url,
                // `apps.connections.open` is itself a rate-limited Web API
                // call - this is the one place a genuine Slack-issued
                // Retry-After is available (§4.6: "backoff uses the
                // server-provided delay").
                Err(ConnectionError::Open(WebApiError::RateLimited { retry_after })) => {
                    self.telemetry.emit(Event::new("connection", "rate_limited"));
                    self.sleep_backoff(Some(retry_after));
                    continue;
                }
                Err(_) => {
                    self.sleep_backoff(None);
                    continue;
                }
            };

            let mut socket = match connect(url.as_str()) {
                Ok((socket, _)) => socket,
                Err(_) => {
                    self.sleep_backoff(None);
                    continue;
                }
            };
            if set_socket_nonblocking(&mut socket).is_err() {
                self.sleep_backoff(None);
                continue;
            }
            self.emit_state(ConnectionState::Connected);

            let outcome = self.read_loop(&mut socket, stop);
            let _ = socket.close(None);

            match outcome {
                LoopOutcome::Disconnect => {
                    self.emit_state(ConnectionState::Disconnected);
                    self.sleep_disconnect();
                }
                LoopOutcome::Dead | LoopOutcome::TransportError(_) => {
                    self.emit_state(ConnectionState::Disconnected);
                    self.sleep_backoff(None);
                }
            }
        }
        Ok(())
    }

    fn sleep_backoff(&self, server_delay: Option<Duration>) {
        self.emit_state(ConnectionState::Backoff);
        let delay = self
            .backoff
            .lock()
            .expect("backoff lock poisoned")
            .next(server_delay);
        thread::sleep(delay);
    }

    /// Reconnect delay for a `disconnect` frame (§4.6). Fixed and short,
    /// deliberately bypassing the exponential backoff counter - this is
    /// the documented reconnect-on-request path, not a failure.
    fn sleep_disconnect(&self) {
        self.emit_state(ConnectionState::Backoff);
        thread::sleep(DISCONNECT_RECONNECT_DELAY);
    }

    /// The socket loop itself. Must never block on handler work (§5):
    /// every non-control envelope is handed to `sink.accept` on its own
    /// thread, ack is sent synchronously first.
    fn read_loop(
        &self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        stop: &AtomicBool,
    ) -> LoopOutcome {
        let mut last_frame_at = Instant::now();
        let mut ready = false;

        loop {
            if stop.load(Ordering::Relaxed) {
                return LoopOutcome::Disconnect;
            }
            if last_frame_at.elapsed() > self.idle_timeout {
                return LoopOutcome::Dead;
            }

            match socket.read() {
                Ok(Message::Text(text)) => {
                    last_frame_at = Instant::now();
                    if let Some(outcome) = self.handle_text(socket, &text, &mut ready) {
                        return outcome;
                    }
                }
                Ok(Message::Ping(payload)) => {
                    last_frame_at = Instant::now();
                    let _ = socket.send(Message::Pong(payload));
                }
                Ok(Message::Pong(_)) => last_frame_at = Instant::now(),
                Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return LoopOutcome::Dead,
                Err(tungstenite::Error::Io(err))
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    thread::sleep(SOCKET_IDLE_SLEEP);
                }
                Err(tungstenite::Error::ConnectionClosed) => return LoopOutcome::Dead,
                Err(err) => return LoopOutcome::TransportError(err.to_string()),
            }
        }
    }

    fn handle_text(
        &self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        text: &str,
        ready: &mut bool,
    ) -> Option<LoopOutcome> {
        let wire: WireEnvelope = serde_json::from_str(text).ok()?;
        let envelope_id = wire.envelope_id.clone();
        let envelope = wire.classify()?;

        if let Some(envelope_id) = envelope_id {
            let ack_payload = self.sink.ack_payload(&envelope);
            let mut ack = json!({ "envelope_id": envelope_id });
            if let Some(payload) = ack_payload {
                ack["payload"] = payload;
            }
            let _ = socket.send(Message::Text(ack.to_string()));
        }

        match envelope.envelope_type {
            EnvelopeType::Hello => {
                if !*ready {
                    *ready = true;
                    self.emit_state(ConnectionState::Ready);
                    self.backoff.lock().expect("backoff lock poisoned").reset();
                }
                None
            }
            // Any `disconnect` reason (`"refresh"` is the documented common
            // case) reconnects after a short fixed delay; Socket Mode's
            // disconnect frame never carries a real Retry-After, so this
            // must never be reported as a rate-limit-driven reconnect.
            EnvelopeType::Disconnect => Some(LoopOutcome::Disconnect),
            _ => {
                if *ready {
                    self.dispatch_to_sink(envelope);
                }
                None
            }
        }
    }

    fn dispatch_to_sink(&self, envelope: Envelope) {
        let sink = Arc::clone(&self.sink);
        thread::spawn(move || {
            let _ = panic::catch_unwind(AssertUnwindSafe(|| sink.accept(envelope)));
        });
    }
}

fn set_socket_nonblocking(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
) -> Result<(), ConnectionError> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_nonblocking(true),
        _ => Ok(()),
    }
    .map_err(|err| ConnectionError::Transport(format!("failed to configure socket stream: {err}")))
}
