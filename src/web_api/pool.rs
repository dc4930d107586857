use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size worker pool backing `push_async` (§4.5, §6: "a shared
/// connection pool (size/count configurable) reused across all Web API
/// calls from one instance"). Plain thread-per-worker consuming a shared
/// channel, matching the crate's no-async-runtime concurrency model.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let receiver = Arc::clone(&receiver);
            workers.push(std::thread::spawn(move || loop {
                let job = {
                    let receiver = receiver.lock().expect("worker pool lock poisoned");
                    receiver.recv()
                };
                match job {
                    Ok(job) => job(),
                    Err(_) => break,
                }
            }));
        }
        Self {
            sender: Some(sender),
            workers,
        }
    }

    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(job));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Drop the sender first so every worker's blocking `recv` returns
        // `Err` and its loop exits; only then join, or workers would wait
        // on a channel that never closes (see `MutationQueue`'s same shape).
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
