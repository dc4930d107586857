//! Top-level lifecycle orchestrator (§9 "typed handles" + "one-for-one
//! restart"). Generalizes the teacher's `runtime::supervisor` — which
//! spawns one thread per configured channel worker and feeds a shared
//! `mpsc` event channel — into this crate's fixed trio of long-running
//! components: the connection manager and the two cache sync pagers. Each
//! is wrapped so a panic restarts it with exponential backoff instead of
//! silently ending the thread; a normal return (stop requested) simply
//! joins.

use crate::cache::channels_sync::ChannelsSyncSource;
use crate::cache::identity::resolve_bot_user_id;
use crate::cache::users_sync::UsersSyncSource;
use crate::cache::{sync, MutationQueue, Provider};
use crate::config::{CacheSyncKind, Config, ConfigError, ConfigStore, EventBufferAdapterKind};
use crate::connection::{ConnectionManager, EnvelopeSink};
use crate::diagnostics::Diagnostics;
use crate::event_buffer::external::RedisEventBuffer;
use crate::event_buffer::memory::InMemoryEventBuffer;
use crate::event_buffer::{EventBuffer, EventBufferAdapter};
use crate::pipeline::ack::AckStrategy;
use crate::pipeline::{DispatchTable, HandlerPipeline};
use crate::rate_limiter::RateLimiter;
use crate::shared::CoreError;
use crate::telemetry::{
    default_telemetry_path, Event, JsonFileTelemetry, NamespacedTelemetry, NullTelemetry, Telemetry,
};
use crate::web_api::transport::UreqTransport;
use crate::web_api::WebApiClient;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RESTART_BASE_DELAY: Duration = Duration::from_secs(1);
const RESTART_MAX_DELAY: Duration = Duration::from_secs(60);

/// Explicit struct of typed handles to every subsystem, replacing the
/// source's atom-derived child process names (§9 "per-instance atom names
/// -> typed handles"). Every field is independently reachable so embedders
/// can, e.g., read `diagnostics.list(..)` or call `web_api.push(..)`
/// directly without going through the supervised loop.
pub struct Instance {
    pub config_store: Arc<ConfigStore>,
    pub telemetry: Arc<dyn Telemetry>,
    pub diagnostics: Arc<Diagnostics>,
    pub event_buffer: Arc<EventBuffer>,
    pub provider: Arc<Provider>,
    pub mutation_queue: Arc<MutationQueue>,
    pub rate_limiter: Arc<RateLimiter>,
    pub web_api: Arc<WebApiClient>,
    pub pipeline: Arc<HandlerPipeline>,
    connection: Arc<ConnectionManager>,
    state_root: PathBuf,
    cache_sync_kinds: Vec<CacheSyncKind>,
    cache_sync_interval: Duration,
    cache_sync_page_limit: usize,
    user_cache_ttl: Duration,
}

impl Instance {
    /// Builds every subsystem from one validated `Config`, using the
    /// config's own `ack_mode` (`silent` or `ephemeral`). Use
    /// [`Instance::new_with_ack_strategy`] when the embedder needs a
    /// `{custom, fn}` ack body, since `AckModeSetting` (the serializable
    /// half of config) has no function variant.
    pub fn new(config: Config, table: DispatchTable, state_root: PathBuf) -> Result<Self, CoreError> {
        let ack_strategy = AckStrategy::from(config.ack_mode);
        Self::build(config, table, state_root, ack_strategy)
    }

    pub fn new_with_ack_strategy(
        config: Config,
        table: DispatchTable,
        state_root: PathBuf,
        ack_strategy: AckStrategy,
    ) -> Result<Self, CoreError> {
        Self::build(config, table, state_root, ack_strategy)
    }

    fn build(
        config: Config,
        table: DispatchTable,
        state_root: PathBuf,
        ack_strategy: AckStrategy,
    ) -> Result<Self, CoreError> {
        let telemetry: Arc<dyn Telemetry> = if config.diagnostics.enabled {
            Arc::new(JsonFileTelemetry::new(default_telemetry_path(&state_root)))
        } else {
            Arc::new(NullTelemetry)
        };
        // Stamp every event this instance emits with the configured
        // `telemetry_prefix` (§4.1, §6) before it reaches the inner sink.
        let telemetry: Arc<dyn Telemetry> =
            Arc::new(NamespacedTelemetry::new(telemetry, config.telemetry_prefix.clone()));
        let diagnostics = Arc::new(Diagnostics::new(config.diagnostics.enabled, config.diagnostics.buffer_size));

        let adapter: Arc<dyn EventBufferAdapter> = match config.event_buffer_adapter.kind {
            EventBufferAdapterKind::Memory => Arc::new(InMemoryEventBuffer::default()),
            EventBufferAdapterKind::External => {
                let url = config.event_buffer_adapter.external_url.clone().unwrap_or_default();
                let ttl = Duration::from_millis(config.event_buffer_adapter.ttl_ms);
                Arc::new(RedisEventBuffer::connect(&url, ttl)?)
            }
        };
        let event_buffer = Arc::new(EventBuffer::new(
            config.instance_name.clone(),
            Duration::from_millis(config.event_buffer_adapter.ttl_ms),
            adapter,
        ));

        let provider = Arc::new(Provider::new());
        let mutation_queue = Arc::new(MutationQueue::new(Arc::clone(&provider)));

        let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&telemetry)));
        let transport = Arc::new(UreqTransport::new(Duration::from_millis(
            config.api_pool_opts.request_timeout_ms,
        )));
        let web_api = Arc::new(WebApiClient::new(
            transport,
            Arc::clone(&rate_limiter),
            Arc::clone(&telemetry),
            config.bot_token.clone(),
            config.app_token.clone(),
            config.api_pool_opts.pool_size,
        ));

        let bot_user_id = resolve_bot_user_id(&web_api, config.bot_user_id.as_deref())?;
        let user_cache_ttl = Duration::from_millis(config.user_cache.ttl_ms);

        let pipeline = Arc::new(HandlerPipeline::new(
            table,
            Arc::clone(&event_buffer),
            Arc::clone(&diagnostics),
            Arc::clone(&telemetry),
            ack_strategy,
            Arc::clone(&mutation_queue),
            bot_user_id,
            user_cache_ttl,
        ));

        let connection = Arc::new(ConnectionManager::new(
            Arc::clone(&web_api),
            Arc::clone(&telemetry),
            Arc::clone(&pipeline) as Arc<dyn EnvelopeSink>,
            Duration::from_millis(config.connection.socket_idle_timeout_ms),
        ));

        Ok(Self {
            config_store: Arc::new(ConfigStore::new(config.clone())),
            telemetry,
            diagnostics,
            event_buffer,
            provider,
            mutation_queue,
            rate_limiter,
            web_api,
            pipeline,
            connection,
            state_root,
            cache_sync_kinds: config.cache_sync.kinds.clone(),
            cache_sync_interval: Duration::from_millis(config.cache_sync.interval_ms),
            cache_sync_page_limit: config.cache_sync.page_limit as usize,
            user_cache_ttl: Duration::from_millis(config.user_cache.ttl_ms),
        })
    }

    /// Hot-swaps the published config snapshot (§4.1). Does not affect any
    /// subsystem already built from the prior snapshot — only components
    /// that call `config_store.config()` on every use observe the change.
    pub fn reload_config(&self, candidate: Config) -> Result<(), ConfigError> {
        self.config_store.reload(candidate)
    }

    /// Runs the connection manager and (if enabled) the cache sync pagers
    /// until `stop` is set, restarting any that panic with exponential
    /// backoff. Blocks until every supervised thread has exited.
    pub fn run_until_stop(&self, stop: &Arc<AtomicBool>) {
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        handles.push(self.supervise_connection(Arc::clone(stop)));

        if self.cache_sync_kinds.contains(&CacheSyncKind::Users) {
            handles.push(self.supervise_users_sync(Arc::clone(stop)));
        }
        if self.cache_sync_kinds.contains(&CacheSyncKind::Channels) {
            handles.push(self.supervise_channels_sync(Arc::clone(stop)));
        }

        for handle in handles {
            let _ = handle.join();
        }
    }

    fn supervise_connection(&self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let connection = Arc::clone(&self.connection);
        let telemetry = Arc::clone(&self.telemetry);
        supervise("connection", stop, telemetry, move |stop| {
            let _ = connection.run_until_stop(stop);
        })
    }

    fn supervise_users_sync(&self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let source = UsersSyncSource::new(Arc::clone(&self.web_api));
        let queue = Arc::clone(&self.mutation_queue);
        let telemetry = Arc::clone(&self.telemetry);
        let config = sync::SyncWorkerConfig {
            kind: "users",
            page_limit: self.cache_sync_page_limit,
            interval: self.cache_sync_interval,
            state_root: self.state_root.clone(),
        };
        let ttl = self.user_cache_ttl;
        let worker_telemetry = Arc::clone(&telemetry);
        supervise("cache_sync_users", stop, telemetry, move |stop| {
            sync::run_sync_worker(
                &source,
                &queue,
                &config,
                &|row, queue| sync::put_user_mutation(row, queue, ttl),
                worker_telemetry.as_ref(),
                stop,
            );
        })
    }

    fn supervise_channels_sync(&self, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        let source = ChannelsSyncSource::new(Arc::clone(&self.web_api));
        let queue = Arc::clone(&self.mutation_queue);
        let telemetry = Arc::clone(&self.telemetry);
        let config = sync::SyncWorkerConfig {
            kind: "channels",
            page_limit: self.cache_sync_page_limit,
            interval: self.cache_sync_interval,
            state_root: self.state_root.clone(),
        };
        let worker_telemetry = Arc::clone(&telemetry);
        supervise("cache_sync_channels", stop, telemetry, move |stop| {
            sync::run_sync_worker(
                &source,
                &queue,
                &config,
                &sync::join_channel_mutation,
                worker_telemetry.as_ref(),
                stop,
            );
        })
    }
}

/// One-for-one restart (§9): `run` is expected to block until `stop` is
/// set and then return. A panic is caught, logged, and retried after an
/// exponential backoff (capped, no jitter needed since this guards against
/// programming bugs, not external rate limits); a clean return when
/// `stop` is set ends the thread.
fn supervise<F>(name: &'static str, stop: Arc<AtomicBool>, telemetry: Arc<dyn Telemetry>, mut run: F) -> JoinHandle<()>
where
    F: FnMut(&AtomicBool) + Send + 'static,
{
    thread::spawn(move || {
        let mut delay = RESTART_BASE_DELAY;
        while !stop.load(Ordering::Relaxed) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(stop.as_ref())));
            if stop.load(Ordering::Relaxed) {
                return;
            }
            if outcome.is_err() {
                telemetry.emit(
                    Event::new("instance", "worker_restart")
                        .with_metadata("worker", name.to_string()),
                );
                thread::sleep(delay);
                delay = (delay * 2).min(RESTART_MAX_DELAY);
            } else {
                delay = RESTART_BASE_DELAY;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DispatchTable;
    use tempfile::tempdir;

    fn test_config() -> Config {
        serde_yaml::from_str("app_token: xapp-1\nbot_token: xoxb-1\nbot_user_id: UCONFIGURED\n")
            .expect("parse")
    }

    #[test]
    fn builds_all_subsystems_from_config() {
        let temp = tempdir().expect("tempdir");
        let instance = Instance::new(test_config(), DispatchTable::new(), temp.path().to_path_buf())
            .expect("instance builds");
        assert_eq!(instance.config_store.config().bot_token, "xoxb-1");
        assert!(instance.provider.channels().is_empty());
    }

    #[test]
    fn reload_swaps_config_snapshot() {
        let temp = tempdir().expect("tempdir");
        let instance = Instance::new(test_config(), DispatchTable::new(), temp.path().to_path_buf())
            .expect("instance builds");
        let mut updated = test_config();
        updated.bot_token = "xoxb-2".into();
        instance.reload_config(updated).expect("reload ok");
        assert_eq!(instance.config_store.config().bot_token, "xoxb-2");
    }
}
