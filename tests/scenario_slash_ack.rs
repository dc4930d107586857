//! S1: a slash command is acked synchronously with the default ephemeral
//! body, then the registered handler posts the real response via the Web
//! API client.

use serde_json::{json, Value};
use slack_socket_core::cache::{MutationQueue, Provider};
use slack_socket_core::connection::EnvelopeSink;
use slack_socket_core::envelope::{Envelope, EnvelopeType};
use slack_socket_core::event_buffer::memory::InMemoryEventBuffer;
use slack_socket_core::event_buffer::EventBuffer;
use slack_socket_core::pipeline::ack::AckStrategy;
use slack_socket_core::pipeline::context::Context;
use slack_socket_core::pipeline::{DispatchTable, Handler, HandlerOutcome, HandlerPipeline};
use slack_socket_core::rate_limiter::RateLimiter;
use slack_socket_core::shared::ids::InstanceName;
use slack_socket_core::telemetry::RecordingTelemetry;
use slack_socket_core::web_api::transport::{HttpTransport, RawResponse, TransportError};
use slack_socket_core::web_api::{TokenKind, WebApiClient};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct RecordingTransport {
    posted: Mutex<Vec<(String, Value)>>,
}

impl HttpTransport for RecordingTransport {
    fn post(&self, method: &str, _token: &str, body: &Value) -> Result<RawResponse, TransportError> {
        self.posted.lock().unwrap().push((method.to_string(), body.clone()));
        Ok(RawResponse {
            status: 200,
            retry_after: None,
            body: json!({"ok": true, "ts": "1"}),
        })
    }
}

struct PostQueuedHandler {
    web_api: Arc<WebApiClient>,
}

impl Handler for PostQueuedHandler {
    fn handle(&self, _envelope_type: EnvelopeType, payload: &Value, _ctx: &Context) -> HandlerOutcome {
        let channel = payload["channel_id"].as_str().unwrap().to_string();
        let _ = self.web_api.push(
            "chat.postMessage",
            json!({"channel": channel, "text": "Queued"}),
            TokenKind::Bot,
        );
        HandlerOutcome::Continue
    }
}

#[test]
fn slash_command_is_acked_then_dispatches_a_chat_post_message() {
    let telemetry = Arc::new(RecordingTelemetry::new());
    let diagnostics = Arc::new(slack_socket_core::diagnostics::Diagnostics::new(true, 16));
    let event_buffer = Arc::new(EventBuffer::new(
        InstanceName::default(),
        Duration::from_secs(60),
        Arc::new(InMemoryEventBuffer::default()),
    ));
    let provider = Arc::new(Provider::new());
    let mutation_queue = Arc::new(MutationQueue::new(provider));

    let transport = Arc::new(RecordingTransport {
        posted: Mutex::new(Vec::new()),
    });
    let rate_limiter = Arc::new(RateLimiter::new(telemetry.clone()));
    let transport_dyn: Arc<dyn HttpTransport> = transport.clone();
    let web_api = Arc::new(WebApiClient::new(
        transport_dyn,
        rate_limiter,
        telemetry.clone(),
        "xoxb-1".into(),
        "xapp-1".into(),
        2,
    ));

    let mut table = DispatchTable::new();
    table.on(
        EnvelopeType::SlashCommands,
        Arc::new(PostQueuedHandler {
            web_api: web_api.clone(),
        }),
    );

    let pipeline = HandlerPipeline::new(
        table,
        event_buffer,
        diagnostics,
        telemetry,
        AckStrategy::Ephemeral,
        mutation_queue,
        "UBOT".into(),
        Duration::from_secs(3600),
    );

    let envelope = Envelope {
        envelope_id: Some("e1".into()),
        envelope_type: EnvelopeType::SlashCommands,
        payload: json!({"command": "/demo", "text": "report platform", "channel_id": "C1"}),
        accepts_response_payload: true,
        retry_attempt: 0,
        retry_reason: None,
    };

    let ack = pipeline.ack_payload(&envelope);
    assert_eq!(ack, Some(json!({"text": "Processing..."})));

    pipeline.dispatch(envelope);

    let posted = transport.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "chat.postMessage");
    assert_eq!(posted[0].1["channel"], json!("C1"));
    assert_eq!(posted[0].1["text"], json!("Queued"));
}
