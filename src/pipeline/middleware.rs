use super::context::Context;
use crate::envelope::EnvelopeType;
use serde_json::Value;

/// Result of one middleware call (§4.7 step 4). `Continue` may rewrite the
/// payload/context for downstream middleware and handlers; `Halt` stops
/// the chain immediately, including any handlers that would have run.
pub enum Outcome {
    Continue { payload: Value, ctx: Context },
    Halt { response: Option<Value> },
}

pub trait Middleware: Send + Sync {
    fn call(&self, envelope_type: EnvelopeType, payload: Value, ctx: Context) -> Outcome;
}
