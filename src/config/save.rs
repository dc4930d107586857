use super::{default_config_path, validate_config, Config, ConfigError};
use crate::shared::fs_atomic::atomic_write_file;
use std::path::PathBuf;

/// Persists `config` to the default path, validating the full document
/// before writing (a partially-invalid file is never saved).
pub fn save_config(config: &Config) -> Result<PathBuf, ConfigError> {
    validate_config(config)?;

    let path = default_config_path()?;
    let body = serde_yaml::to_string(config).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    atomic_write_file(&path, body.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}
