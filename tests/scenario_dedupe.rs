//! S2: the same envelope delivered twice within the TTL window invokes the
//! handler exactly once, and telemetry records one `new` decision and one
//! `duplicate` decision.

use serde_json::{json, Value};
use slack_socket_core::cache::{MutationQueue, Provider};
use slack_socket_core::diagnostics::Diagnostics;
use slack_socket_core::envelope::{Envelope, EnvelopeType};
use slack_socket_core::event_buffer::memory::InMemoryEventBuffer;
use slack_socket_core::event_buffer::EventBuffer;
use slack_socket_core::pipeline::ack::AckStrategy;
use slack_socket_core::pipeline::context::Context;
use slack_socket_core::pipeline::{DispatchTable, Handler, HandlerOutcome, HandlerPipeline};
use slack_socket_core::shared::ids::InstanceName;
use slack_socket_core::telemetry::RecordingTelemetry;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct CountingHandler {
    calls: Arc<Mutex<Vec<Value>>>,
}

impl Handler for CountingHandler {
    fn handle(&self, _envelope_type: EnvelopeType, payload: &Value, _ctx: &Context) -> HandlerOutcome {
        self.calls.lock().unwrap().push(payload.clone());
        HandlerOutcome::Continue
    }
}

#[test]
fn duplicate_delivery_within_ttl_invokes_handler_once() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut table = DispatchTable::new();
    table.on(
        EnvelopeType::EventsApi,
        Arc::new(CountingHandler { calls: calls.clone() }),
    );

    let telemetry = Arc::new(RecordingTelemetry::new());
    let diagnostics = Arc::new(Diagnostics::new(true, 16));
    let event_buffer = Arc::new(EventBuffer::new(
        InstanceName::default(),
        Duration::from_secs(60),
        Arc::new(InMemoryEventBuffer::default()),
    ));
    let provider = Arc::new(Provider::new());
    let mutation_queue = Arc::new(MutationQueue::new(provider));

    let pipeline = HandlerPipeline::new(
        table,
        event_buffer,
        diagnostics,
        telemetry.clone(),
        AckStrategy::Silent,
        mutation_queue,
        "UBOT".into(),
        Duration::from_secs(3600),
    );

    let envelope = Envelope {
        envelope_id: Some("e1".into()),
        envelope_type: EnvelopeType::EventsApi,
        payload: json!({"event": {"type": "message", "text": "hi"}}),
        accepts_response_payload: false,
        retry_attempt: 0,
        retry_reason: None,
    };

    pipeline.dispatch(envelope.clone());
    pipeline.dispatch(envelope);

    assert_eq!(calls.lock().unwrap().len(), 1);
    let events = telemetry.events();
    let new_count = events
        .iter()
        .filter(|e| e.prefix == "handler" && e.name == "ingress" && e.metadata.get("decision") == Some(&json!("new")))
        .count();
    let duplicate_count = events
        .iter()
        .filter(|e| {
            e.prefix == "handler" && e.name == "ingress" && e.metadata.get("decision") == Some(&json!("duplicate"))
        })
        .count();
    assert_eq!(new_count, 1);
    assert_eq!(duplicate_count, 1);
}
