pub mod error;
pub mod load;
pub mod paths;
pub mod save;
pub mod store;
pub mod validate;

pub use error::ConfigError;
pub use load::load_config;
pub use paths::{default_config_path, default_state_root};
pub use save::save_config;
pub use store::ConfigStore;
pub use validate::validate_config;

use crate::shared::ids::InstanceName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AckModeSetting {
    /// No automatic ack body is sent; the handler is fully responsible for
    /// responding (or not) to the slash command.
    Silent,
    /// A default "Processing..." ack body is posted before handlers run.
    Ephemeral,
}

impl Default for AckModeSetting {
    fn default() -> Self {
        Self::Ephemeral
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSyncKind {
    Users,
    Channels,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheSyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sync_kinds")]
    pub kinds: Vec<CacheSyncKind>,
    #[serde(default = "default_cache_sync_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_cache_page_limit")]
    pub page_limit: u32,
    #[serde(default)]
    pub include_presence: bool,
}

fn default_true() -> bool {
    true
}

fn default_sync_kinds() -> Vec<CacheSyncKind> {
    vec![CacheSyncKind::Users, CacheSyncKind::Channels]
}

fn default_cache_sync_interval_ms() -> u64 {
    10 * 60 * 1000
}

fn default_cache_page_limit() -> u32 {
    200
}

impl Default for CacheSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kinds: default_sync_kinds(),
            interval_ms: default_cache_sync_interval_ms(),
            page_limit: default_cache_page_limit(),
            include_presence: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EventBufferAdapterKind {
    Memory,
    External,
}

impl Default for EventBufferAdapterKind {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventBufferAdapterConfig {
    #[serde(default)]
    pub kind: EventBufferAdapterKind,
    #[serde(default = "default_event_buffer_ttl_ms")]
    pub ttl_ms: u64,
    /// Only consulted when `kind == External`.
    #[serde(default)]
    pub external_url: Option<String>,
}

fn default_event_buffer_ttl_ms() -> u64 {
    5 * 60 * 1000
}

impl Default for EventBufferAdapterConfig {
    fn default() -> Self {
        Self {
            kind: EventBufferAdapterKind::default(),
            ttl_ms: default_event_buffer_ttl_ms(),
            external_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserCacheConfig {
    #[serde(default = "default_user_cache_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_user_cache_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

fn default_user_cache_ttl_ms() -> u64 {
    60 * 60 * 1000
}

fn default_user_cache_cleanup_interval_ms() -> u64 {
    60 * 1000
}

impl Default for UserCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_user_cache_ttl_ms(),
            cleanup_interval_ms: default_user_cache_cleanup_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiPoolOpts {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_pool_size() -> usize {
    8
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

impl Default for ApiPoolOpts {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_socket_idle_timeout_ms")]
    pub socket_idle_timeout_ms: u64,
}

fn default_socket_idle_timeout_ms() -> u64 {
    60 * 1000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_idle_timeout_ms: default_socket_idle_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_diagnostics_buffer_size")]
    pub buffer_size: usize,
}

fn default_diagnostics_buffer_size() -> usize {
    500
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: default_diagnostics_buffer_size(),
        }
    }
}

/// Immutable configuration snapshot. Every other component reads this
/// through `ConfigStore::config()` on demand rather than caching fields
/// across a suspension point, since `reload` can swap the whole snapshot
/// out from under long-lived workers at any time.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub app_token: String,
    pub bot_token: String,
    /// Known bot `user_id`, when the embedder already has it. Left unset,
    /// it's resolved once at startup via `auth.test` (§4.3 step 1).
    #[serde(default)]
    pub bot_user_id: Option<String>,
    #[serde(default)]
    pub instance_name: InstanceName,
    #[serde(default = "default_telemetry_prefix")]
    pub telemetry_prefix: String,
    #[serde(default)]
    pub cache_sync: CacheSyncConfig,
    #[serde(default)]
    pub event_buffer_adapter: EventBufferAdapterConfig,
    #[serde(default)]
    pub user_cache: UserCacheConfig,
    #[serde(default)]
    pub api_pool_opts: ApiPoolOpts,
    #[serde(default)]
    pub ack_mode: AckModeSetting,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub assigns: BTreeMap<String, Value>,
}

fn default_telemetry_prefix() -> String {
    "slack_socket_core".to_string()
}

impl Config {
    /// Loads tokens from `SLACK_APP_TOKEN`/`SLACK_BOT_TOKEN` (§6, "Environment
    /// variables consumed") and layers everything else on top of defaults.
    /// Used by callers that don't need a YAML file on disk.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_token = non_empty_env("SLACK_APP_TOKEN")?;
        let bot_token = non_empty_env("SLACK_BOT_TOKEN")?;
        Ok(Self {
            app_token,
            bot_token,
            bot_user_id: None,
            instance_name: InstanceName::default(),
            telemetry_prefix: default_telemetry_prefix(),
            cache_sync: CacheSyncConfig::default(),
            event_buffer_adapter: EventBufferAdapterConfig::default(),
            user_cache: UserCacheConfig::default(),
            api_pool_opts: ApiPoolOpts::default(),
            ack_mode: AckModeSetting::default(),
            connection: ConnectionConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            assigns: BTreeMap::new(),
        })
    }
}

fn non_empty_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_populated_when_absent() {
        let yaml = "app_token: xapp-1\nbot_token: xoxb-1\n";
        let config: Config = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.instance_name.as_str(), "default");
        assert_eq!(config.ack_mode, AckModeSetting::Ephemeral);
        assert_eq!(config.diagnostics.buffer_size, 500);
        assert!(config.cache_sync.kinds.contains(&CacheSyncKind::Users));
    }
}
