use super::{Config, ConfigError, EventBufferAdapterKind};

/// Validates the full merged document before a `ConfigStore::reload` is
/// allowed to publish it (§4.1: "partial failures leave the old snapshot
/// intact").
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.app_token.trim().is_empty() {
        return Err(ConfigError::Invalid("app_token must not be empty".into()));
    }
    if config.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("bot_token must not be empty".into()));
    }
    if config.event_buffer_adapter.kind == EventBufferAdapterKind::External
        && config
            .event_buffer_adapter
            .external_url
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return Err(ConfigError::Invalid(
            "event_buffer_adapter.external_url is required when kind = external".into(),
        ));
    }
    if config.event_buffer_adapter.ttl_ms == 0 {
        return Err(ConfigError::Invalid(
            "event_buffer_adapter.ttl_ms must be greater than zero".into(),
        ));
    }
    if config.user_cache.ttl_ms == 0 {
        return Err(ConfigError::Invalid(
            "user_cache.ttl_ms must be greater than zero".into(),
        ));
    }
    if config.diagnostics.buffer_size == 0 {
        return Err(ConfigError::Invalid(
            "diagnostics.buffer_size must be greater than zero".into(),
        ));
    }
    if config.api_pool_opts.pool_size == 0 {
        return Err(ConfigError::Invalid(
            "api_pool_opts.pool_size must be greater than zero".into(),
        ));
    }
    if config.connection.socket_idle_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "connection.socket_idle_timeout_ms must be greater than zero".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn base_config() -> Config {
        serde_yaml::from_str("app_token: xapp-1\nbot_token: xoxb-1\n").expect("parse")
    }

    #[test]
    fn rejects_empty_tokens() {
        let mut config = base_config();
        config.bot_token = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn external_adapter_requires_url() {
        let mut config = base_config();
        config.event_buffer_adapter.kind = EventBufferAdapterKind::External;
        assert!(validate_config(&config).is_err());
        config.event_buffer_adapter.external_url = Some("redis://localhost".into());
        assert!(validate_config(&config).is_ok());
    }
}
