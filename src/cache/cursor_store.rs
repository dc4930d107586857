use super::CacheError;
use crate::shared::fs_atomic::atomic_write_file;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Resumable pagination state for one sync worker (§4.3: "pending_sync =
/// {cursor, count}"). Persisted to disk so a restart mid-sweep resumes
/// from the saved cursor instead of re-fetching page 1.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PendingSync {
    #[serde(default)]
    pub cursor: String,
    #[serde(default)]
    pub count: usize,
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn cursor_path(state_root: &Path, kind: &str) -> PathBuf {
    state_root.join("cache").join(sanitize_component(kind)).join("cursor.json")
}

pub fn load_pending_sync(state_root: &Path, kind: &str) -> Result<PendingSync, CacheError> {
    let path = cursor_path(state_root, kind);
    if !path.exists() {
        return Ok(PendingSync::default());
    }
    let raw = fs::read_to_string(&path).map_err(|e| CacheError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_str(&raw).map_err(|e| CacheError::Json {
        path: path.display().to_string(),
        source: e,
    })
}

pub fn save_pending_sync(state_root: &Path, kind: &str, state: &PendingSync) -> Result<(), CacheError> {
    let path = cursor_path(state_root, kind);
    let body = serde_json::to_vec_pretty(state).map_err(|e| CacheError::Json {
        path: path.display().to_string(),
        source: e,
    })?;
    atomic_write_file(&path, &body).map_err(|e| CacheError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pending_sync_round_trips() {
        let temp = tempdir().expect("tempdir");
        let state_root = temp.path().join(".slack-socket-core");
        let state = PendingSync {
            cursor: "abc123".into(),
            count: 42,
        };
        save_pending_sync(&state_root, "users", &state).expect("save");
        let loaded = load_pending_sync(&state_root, "users").expect("load");
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_file_yields_default() {
        let temp = tempdir().expect("tempdir");
        let loaded = load_pending_sync(temp.path(), "channels").expect("load");
        assert_eq!(loaded, PendingSync::default());
    }
}
