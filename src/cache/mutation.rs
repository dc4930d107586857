use super::provider::Provider;
use super::CacheError;
use serde_json::Value;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

#[derive(Debug, Clone)]
pub enum Mutation {
    JoinChannel(String),
    LeaveChannel(String),
    PutUser { id: String, data: Value, expires_at_ms: i64 },
    DropUser(String),
    PutMetadata { key: String, value: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    /// Caller blocks until the mutation has been applied.
    Sync,
    /// Fire-and-forget; used by the connection manager so cache writes
    /// never block the socket loop (§5).
    Async,
}

struct Message {
    mutation: Mutation,
    reply: Option<mpsc::Sender<()>>,
}

fn apply(provider: &Provider, mutation: Mutation) {
    match mutation {
        Mutation::JoinChannel(id) => provider.join_channel(id),
        Mutation::LeaveChannel(id) => provider.leave_channel(&id),
        Mutation::PutUser { id, data, expires_at_ms } => {
            let now_ms = crate::shared::time::now_wall_ms();
            let remaining_ms = (expires_at_ms - now_ms).max(0) as u64;
            provider.put_user(id, data, Instant::now() + std::time::Duration::from_millis(remaining_ms));
        }
        Mutation::DropUser(id) => provider.drop_user(&id),
        Mutation::PutMetadata { key, value } => provider.put_metadata(key, value),
    }
}

/// Single-writer serializer in front of `Provider` (§4.3 MutationQueue,
/// §9 "GenServer per concern -> single-writer queues"). One worker thread
/// owns the provider exclusively and drains a bounded channel, so
/// sync-mode callers observe a total order matching call order and
/// async-mode callers observe enqueue order - both hold because there is
/// exactly one consumer.
pub struct MutationQueue {
    sender: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl MutationQueue {
    pub fn new(provider: Arc<Provider>) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();
        let worker = std::thread::spawn(move || {
            while let Ok(message) = receiver.recv() {
                apply(&provider, message.mutation);
                if let Some(reply) = message.reply {
                    let _ = reply.send(());
                }
            }
        });
        Self {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn apply(&self, mutation: Mutation, mode: MutationMode) -> Result<(), CacheError> {
        let sender = self.sender.as_ref().ok_or(CacheError::QueueClosed)?;
        match mode {
            MutationMode::Sync => {
                let (tx, rx) = mpsc::channel();
                sender
                    .send(Message {
                        mutation,
                        reply: Some(tx),
                    })
                    .map_err(|_| CacheError::QueueClosed)?;
                rx.recv().map_err(|_| CacheError::QueueClosed)
            }
            MutationMode::Async => sender
                .send(Message {
                    mutation,
                    reply: None,
                })
                .map_err(|_| CacheError::QueueClosed),
        }
    }
}

impl Drop for MutationQueue {
    fn drop(&mut self) {
        // Drop the sender first so the worker's blocking `recv` returns
        // `Err` and the loop exits; only then join it.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
