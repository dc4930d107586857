use super::{default_config_path, validate_config, Config, ConfigError};
use std::path::Path;

/// Reads and validates a config snapshot from the default path
/// (`$HOME/.slack-socket-core/config.yaml`). `app_token`/`bot_token` in the
/// file are overridden by `SLACK_APP_TOKEN`/`SLACK_BOT_TOKEN` when those env
/// vars are set, so a checked-in config file never needs to carry secrets.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = default_config_path()?;
    load_config_from_path(&path)
}

pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut config: Config = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    if let Ok(app_token) = std::env::var("SLACK_APP_TOKEN") {
        if !app_token.trim().is_empty() {
            config.app_token = app_token;
        }
    }
    if let Ok(bot_token) = std::env::var("SLACK_BOT_TOKEN") {
        if !bot_token.trim().is_empty() {
            config.bot_token = bot_token;
        }
    }

    validate_config(&config)?;
    Ok(config)
}
