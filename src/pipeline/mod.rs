//! Handler Pipeline (§4.7): per-envelope dedupe, middleware chain, and
//! fan-out to registered handlers. §4.6's "hand the envelope to a
//! supervised worker" lands here via `connection::EnvelopeSink`.

pub mod ack;
pub mod context;
pub mod middleware;

use crate::cache::{events, MutationMode, MutationQueue};
use crate::connection::EnvelopeSink;
use crate::diagnostics::{Diagnostics, Direction};
use crate::envelope::{Envelope, EnvelopeType};
use crate::event_buffer::{EventBuffer, RecordOutcome};
use crate::telemetry::{Event, Telemetry};
use ack::AckStrategy;
use context::Context;
use middleware::{Middleware, Outcome};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("handler for {envelope_type:?} panicked: {message}")]
    HandlerPanic {
        envelope_type: EnvelopeType,
        message: String,
    },
}

pub enum HandlerOutcome {
    /// Stops further handlers for this envelope but does not affect ones
    /// that already ran (§4.7 step 5).
    Halt { response: Option<Value> },
    /// Logged with `{status: error}`; later handlers still run.
    Error(String),
    Continue,
}

pub trait Handler: Send + Sync {
    fn handle(&self, envelope_type: EnvelopeType, payload: &Value, ctx: &Context) -> HandlerOutcome;
}

/// The data-driven `{type -> [middleware], [handlers]}` map called for in
/// Design Notes §9, built once at startup.
#[derive(Default)]
pub struct DispatchTable {
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: HashMap<EnvelopeType, Vec<Arc<dyn Handler>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn on(&mut self, envelope_type: EnvelopeType, handler: Arc<dyn Handler>) -> &mut Self {
        self.handlers.entry(envelope_type).or_default().push(handler);
        self
    }
}

pub struct HandlerPipeline {
    table: DispatchTable,
    event_buffer: Arc<EventBuffer>,
    diagnostics: Arc<Diagnostics>,
    telemetry: Arc<dyn Telemetry>,
    ack_strategy: AckStrategy,
    mutation_queue: Arc<MutationQueue>,
    bot_user_id: String,
    user_cache_ttl: Duration,
}

impl HandlerPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        table: DispatchTable,
        event_buffer: Arc<EventBuffer>,
        diagnostics: Arc<Diagnostics>,
        telemetry: Arc<dyn Telemetry>,
        ack_strategy: AckStrategy,
        mutation_queue: Arc<MutationQueue>,
        bot_user_id: String,
        user_cache_ttl: Duration,
    ) -> Self {
        Self {
            table,
            event_buffer,
            diagnostics,
            telemetry,
            ack_strategy,
            mutation_queue,
            bot_user_id,
            user_cache_ttl,
        }
    }

    /// §4.7 dispatch algorithm, steps 1-5 (step 6's ack is handled
    /// separately by `connection::EnvelopeSink::ack_payload` since it must
    /// run synchronously on the socket thread, before this ever runs).
    pub fn dispatch(&self, envelope: Envelope) {
        self.run(envelope, "inbound");
    }

    /// §4.7 "Synthetic emission": skips dedupe, records with
    /// `origin=emit`, and feeds the pipeline exactly as a received
    /// envelope would be.
    pub fn emit(&self, envelope_type: EnvelopeType, payload: Value) {
        self.diagnostics.record(
            Direction::Inbound,
            envelope_type.as_str(),
            payload.clone(),
            serde_json::json!({"origin": "emit"}),
        );
        let envelope = Envelope {
            envelope_id: None,
            envelope_type,
            payload,
            accepts_response_payload: false,
            retry_attempt: 0,
            retry_reason: None,
        };
        self.run_handlers_only(envelope);
    }

    fn run(&self, envelope: Envelope, origin: &str) {
        let key = envelope.dedupe_key();
        let outcome = self.event_buffer.record(key.as_deref(), envelope.payload.clone());
        if outcome == RecordOutcome::Duplicate {
            self.telemetry.emit(
                Event::new("handler", "ingress")
                    .with_metadata("decision", "duplicate")
                    .with_metadata("envelope_type", envelope.envelope_type.as_str().to_string()),
            );
            return;
        }
        self.telemetry.emit(
            Event::new("handler", "ingress")
                .with_metadata("decision", "new")
                .with_metadata("envelope_type", envelope.envelope_type.as_str().to_string()),
        );

        self.diagnostics.record(
            Direction::Inbound,
            envelope.envelope_type.as_str(),
            envelope.payload.clone(),
            serde_json::json!({"origin": origin, "envelope_id": envelope.envelope_id}),
        );

        self.update_cache_from_event(envelope.envelope_type, &envelope.payload);
        self.run_handlers_only(envelope);
    }

    /// §4.3 "Event-driven updates": keeps the cache current between sync
    /// sweeps by translating `member_joined_channel` / `member_left_channel`
    /// / `user_change` / `team_join` events into cache mutations. Runs
    /// regardless of what middleware or handlers later decide, since it's
    /// bookkeeping, not business logic.
    fn update_cache_from_event(&self, envelope_type: EnvelopeType, payload: &Value) {
        if envelope_type != EnvelopeType::EventsApi {
            return;
        }
        if let Some(mutation) = events::mutation_for_event(payload, &self.bot_user_id, self.user_cache_ttl) {
            let _ = self.mutation_queue.apply(mutation, MutationMode::Async);
        }
    }

    fn run_handlers_only(&self, envelope: Envelope) {
        self.telemetry.emit(
            Event::new("handler", "dispatch").with_metadata("status", "start"),
        );

        let mut payload = envelope.payload;
        let mut ctx = Context::default();

        for middleware in &self.table.middleware {
            match middleware.call(envelope.envelope_type, payload, ctx) {
                Outcome::Continue { payload: p, ctx: c } => {
                    payload = p;
                    ctx = c;
                }
                Outcome::Halt { .. } => {
                    self.telemetry.emit(
                        Event::new("handler", "dispatch").with_metadata("status", "halted"),
                    );
                    return;
                }
            }
        }

        let Some(handlers) = self.table.handlers.get(&envelope.envelope_type) else {
            self.telemetry.emit(
                Event::new("handler", "dispatch").with_metadata("status", "stop"),
            );
            return;
        };

        for handler in handlers {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle(envelope.envelope_type, &payload, &ctx)
            }));
            match outcome {
                Ok(HandlerOutcome::Continue) => {}
                Ok(HandlerOutcome::Error(reason)) => {
                    self.telemetry.emit(
                        Event::new("handler", "dispatch")
                            .with_metadata("status", "error")
                            .with_metadata("reason", reason),
                    );
                }
                Ok(HandlerOutcome::Halt { .. }) => {
                    self.telemetry.emit(
                        Event::new("handler", "dispatch").with_metadata("status", "stop"),
                    );
                    return;
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "handler panicked".to_string());
                    self.telemetry.emit(
                        Event::new("handler", "dispatch")
                            .with_metadata("status", "exception")
                            .with_metadata("reason", message),
                    );
                }
            }
        }

        self.telemetry.emit(Event::new("handler", "dispatch").with_metadata("status", "stop"));
    }
}

impl EnvelopeSink for HandlerPipeline {
    fn accept(&self, envelope: Envelope) {
        self.run(envelope, "inbound");
    }

    fn ack_payload(&self, envelope: &Envelope) -> Option<Value> {
        if envelope.envelope_type != EnvelopeType::SlashCommands {
            return None;
        }
        self.ack_strategy.ack_body(&envelope.payload)
    }
}
