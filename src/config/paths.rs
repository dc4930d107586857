use crate::config::ConfigError;
use std::path::PathBuf;

pub const DEFAULT_STATE_DIR: &str = ".slack-socket-core";
pub const DEFAULT_SETTINGS_FILE_NAME: &str = "config.yaml";

/// Root directory under which this crate keeps the state it is allowed to
/// persist: cache-sync resumption cursors and (optionally) a diagnostics
/// dump. Message content itself is never written here (see Non-goals).
pub fn default_state_root() -> Result<PathBuf, ConfigError> {
    let home = std::env::var_os("HOME").ok_or(ConfigError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_DIR))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_state_root()?.join(DEFAULT_SETTINGS_FILE_NAME))
}
