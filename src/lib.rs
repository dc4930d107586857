pub mod cache;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod envelope;
pub mod event_buffer;
pub mod instance;
pub mod pipeline;
pub mod rate_limiter;
pub mod shared;
pub mod telemetry;
pub mod web_api;

pub use config::{Config, ConfigStore};
pub use envelope::{Envelope, EnvelopeType};
pub use instance::Instance;
pub use pipeline::{DispatchTable, HandlerPipeline};
pub use shared::CoreError;
