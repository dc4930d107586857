use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct UserEntry {
    pub data: Value,
    pub expires_at: Instant,
}

#[derive(Default)]
struct CacheState {
    channels: HashSet<String>,
    users: HashMap<String, UserEntry>,
    metadata: Map<String, Value>,
}

/// Owns the in-memory cache state (§4.3 Provider). All mutation goes
/// through `MutationQueue`; readers here prune expired user entries
/// inline so a stale entry is never visible (§3 invariant).
#[derive(Default)]
pub struct Provider {
    state: Mutex<CacheState>,
}

impl Provider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join_channel(&self, channel_id: String) {
        self.state.lock().expect("provider lock poisoned").channels.insert(channel_id);
    }

    pub fn leave_channel(&self, channel_id: &str) {
        self.state.lock().expect("provider lock poisoned").channels.remove(channel_id);
    }

    pub fn put_user(&self, user_id: String, data: Value, expires_at: Instant) {
        let mut state = self.state.lock().expect("provider lock poisoned");
        state.users.insert(user_id, UserEntry { data, expires_at });
    }

    pub fn drop_user(&self, user_id: &str) {
        self.state.lock().expect("provider lock poisoned").users.remove(user_id);
    }

    pub fn put_metadata(&self, key: String, value: Value) {
        self.state.lock().expect("provider lock poisoned").metadata.insert(key, value);
    }

    pub fn channels(&self) -> HashSet<String> {
        self.state.lock().expect("provider lock poisoned").channels.clone()
    }

    /// Prunes expired entries before returning the snapshot, so callers
    /// never observe stale users.
    pub fn users(&self) -> HashMap<String, Value> {
        let mut state = self.state.lock().expect("provider lock poisoned");
        let now = Instant::now();
        state.users.retain(|_, entry| entry.expires_at > now);
        state.users.iter().map(|(k, v)| (k.clone(), v.data.clone())).collect()
    }

    pub fn metadata(&self) -> Map<String, Value> {
        self.state.lock().expect("provider lock poisoned").metadata.clone()
    }

    pub fn user_entry(&self, user_id: &str) -> Option<Value> {
        let mut state = self.state.lock().expect("provider lock poisoned");
        let now = Instant::now();
        match state.users.get(user_id) {
            Some(entry) if entry.expires_at > now => Some(entry.data.clone()),
            Some(_) => {
                state.users.remove(user_id);
                None
            }
            None => None,
        }
    }
}
