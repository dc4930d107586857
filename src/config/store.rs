use super::{validate_config, Config, ConfigError};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Wait-free config reads via an atomic snapshot swap (§4.1). `reload`
/// validates the full merged candidate before publishing; on failure the
/// previously published `Arc<Config>` stays live and is returned to every
/// caller of `config()` unchanged.
pub struct ConfigStore {
    current: ArcSwap<Config>,
}

impl ConfigStore {
    pub fn new(initial: Config) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Wait-free read of the current snapshot. Never blocks on a concurrent
    /// `reload`.
    pub fn config(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Validates `candidate` and, only on success, atomically swaps it in.
    pub fn reload(&self, candidate: Config) -> Result<(), ConfigError> {
        validate_config(&candidate)?;
        self.current.store(Arc::new(candidate));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(app_token: &str) -> Config {
        serde_yaml::from_str(&format!("app_token: {app_token}\nbot_token: xoxb-1\n"))
            .expect("parse")
    }

    #[test]
    fn reload_publishes_new_snapshot_on_success() {
        let store = ConfigStore::new(config("xapp-1"));
        assert_eq!(store.config().app_token, "xapp-1");
        store.reload(config("xapp-2")).expect("reload ok");
        assert_eq!(store.config().app_token, "xapp-2");
    }

    #[test]
    fn failed_reload_leaves_previous_snapshot_intact() {
        let store = ConfigStore::new(config("xapp-1"));
        let mut bad = config("xapp-2");
        bad.bot_token.clear();
        let result = store.reload(bad);
        assert!(result.is_err());
        assert_eq!(store.config().app_token, "xapp-1");
    }
}
