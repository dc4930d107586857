//! Cache (§4.3): workspace users/channels snapshot, kept current by a
//! mutation queue serialized against background sync pagers.

pub mod channels_sync;
pub mod cursor_store;
pub mod events;
pub mod identity;
pub mod mutation;
pub mod provider;
pub mod sync;
pub mod users_sync;

pub use mutation::{Mutation, MutationMode, MutationQueue};
pub use provider::Provider;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("mutation queue is closed")]
    QueueClosed,
    #[error("web api error during cache sync: {0}")]
    WebApi(#[from] crate::web_api::WebApiError),
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
