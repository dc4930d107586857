use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::connection::ConnectionError;
use crate::event_buffer::EventBufferError;
use crate::pipeline::PipelineError;
use crate::rate_limiter::RateLimiterError;
use crate::web_api::WebApiError;

/// Umbrella error returned from top-level `Instance` operations. Each
/// subsystem keeps its own focused `thiserror` enum (mirroring the original
/// `SlackError`/`RuntimeError`/`QueueError` split); this type only exists at
/// the seam where callers compose subsystems together.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    EventBuffer(#[from] EventBufferError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    RateLimiter(#[from] RateLimiterError),
    #[error(transparent)]
    WebApi(#[from] WebApiError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
