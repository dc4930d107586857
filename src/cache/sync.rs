use super::cursor_store::{load_pending_sync, save_pending_sync, PendingSync};
use super::mutation::{Mutation, MutationMode, MutationQueue};
use super::CacheError;
use crate::telemetry::{Event, Telemetry};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub enum Page {
    Rows {
        rows: Vec<Value>,
        next_cursor: Option<String>,
    },
    RateLimited {
        retry_after: Duration,
    },
}

/// One page-fetching collaborator per sync kind (users, channels).
/// Implemented against the Web API client elsewhere; kept generic here so
/// the pager's resumption/rate-limit logic is tested without a live
/// client.
pub trait SyncSource: Send + Sync {
    fn fetch_page(&self, cursor: &str, page_limit: usize) -> Result<Page, CacheError>;
}

pub struct SyncWorkerConfig {
    pub kind: &'static str,
    pub page_limit: usize,
    pub interval: Duration,
    pub state_root: PathBuf,
}

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleeps for `duration`, checking `stop` every `STOP_POLL_INTERVAL` so a
/// shutdown request is honored mid-wait instead of only between sweeps.
fn interruptible_sleep(duration: Duration, stop: &AtomicBool) {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let step = remaining.min(STOP_POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
}

/// §4.3 sync worker: "runs once immediately on start, then every
/// interval_ms". Runs on its own thread, so a rate-limit wait here only
/// delays this one pager, never the socket loop or other sync kinds.
pub fn run_sync_worker(
    source: &dyn SyncSource,
    queue: &MutationQueue,
    config: &SyncWorkerConfig,
    apply_row: &dyn Fn(&Value, &MutationQueue),
    telemetry: &dyn Telemetry,
    stop: &AtomicBool,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        run_one_sweep(source, queue, config, apply_row, telemetry, stop);
        interruptible_sleep(config.interval, stop);
    }
}

fn run_one_sweep(
    source: &dyn SyncSource,
    queue: &MutationQueue,
    config: &SyncWorkerConfig,
    apply_row: &dyn Fn(&Value, &MutationQueue),
    telemetry: &dyn Telemetry,
    stop: &AtomicBool,
) {
    let mut pending = load_pending_sync(&config.state_root, config.kind).unwrap_or_default();

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match source.fetch_page(&pending.cursor, config.page_limit) {
            Ok(Page::Rows { rows, next_cursor }) => {
                for row in &rows {
                    apply_row(row, queue);
                }
                pending.count += rows.len();

                match next_cursor.filter(|c| !c.is_empty()) {
                    Some(cursor) => {
                        pending.cursor = cursor;
                        let _ = save_pending_sync(&config.state_root, config.kind, &pending);
                    }
                    None => {
                        telemetry.emit(
                            Event::new("cache", "sync")
                                .with_metadata("kind", config.kind.to_string())
                                .with_measurement("rows", pending.count as i64),
                        );
                        let _ = save_pending_sync(&config.state_root, config.kind, &PendingSync::default());
                        return;
                    }
                }
            }
            Ok(Page::RateLimited { retry_after }) => {
                // Partial progress already persisted above; just wait out
                // the window and resume from the same cursor.
                interruptible_sleep(retry_after, stop);
            }
            Err(_) => return,
        }
    }
}

pub fn put_user_mutation(row: &Value, queue: &MutationQueue, ttl: Duration) {
    let Some(id) = row.get("id").and_then(Value::as_str) else {
        return;
    };
    let expires_at_ms = crate::shared::time::now_wall_ms() + ttl.as_millis() as i64;
    let _ = queue.apply(
        Mutation::PutUser {
            id: id.to_string(),
            data: row.clone(),
            expires_at_ms,
        },
        MutationMode::Async,
    );
}

pub fn join_channel_mutation(row: &Value, queue: &MutationQueue) {
    if let Some(id) = row.get("id").and_then(Value::as_str) {
        let _ = queue.apply(Mutation::JoinChannel(id.to_string()), MutationMode::Async);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::provider::Provider;
    use crate::telemetry::NullTelemetry;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedSource {
        pages: Mutex<Vec<Result<Page, CacheError>>>,
    }

    impl SyncSource for ScriptedSource {
        fn fetch_page(&self, _cursor: &str, _page_limit: usize) -> Result<Page, CacheError> {
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Page::Rows {
                    rows: vec![],
                    next_cursor: None,
                })
            } else {
                pages.remove(0)
            }
        }
    }

    #[test]
    fn resumes_after_rate_limit_without_dropping_fetched_rows() {
        let temp = tempdir().expect("tempdir");
        let provider = Arc::new(Provider::new());
        let queue = MutationQueue::new(Arc::clone(&provider));
        let source = ScriptedSource {
            pages: Mutex::new(vec![
                Ok(Page::Rows {
                    rows: vec![json!({"id": "U1"})],
                    next_cursor: Some("cursor-2".into()),
                }),
                Ok(Page::RateLimited {
                    retry_after: Duration::from_millis(20),
                }),
                Ok(Page::Rows {
                    rows: vec![json!({"id": "U2"})],
                    next_cursor: None,
                }),
            ]),
        };
        let config = SyncWorkerConfig {
            kind: "users",
            page_limit: 200,
            interval: Duration::from_secs(60),
            state_root: temp.path().to_path_buf(),
        };
        let telemetry = NullTelemetry;
        let stop = AtomicBool::new(false);

        run_one_sweep(
            &source,
            &queue,
            &config,
            &|row, queue| put_user_mutation(row, queue, Duration::from_secs(3600)),
            &telemetry,
            &stop,
        );

        // drain the async queue with a sync no-op
        queue
            .apply(Mutation::PutMetadata { key: "drain".into(), value: json!(true) }, MutationMode::Sync)
            .unwrap();

        let users = provider.users();
        assert!(users.contains_key("U1"));
        assert!(users.contains_key("U2"));
    }
}
