//! Best-effort task queue
//!
//! Denormalization work (chat roster updates) runs here after the
//! authoritative write has committed. Submitting never blocks: when the
//! queue is full the task is dropped and logged. Failures are logged and
//! counted, never propagated.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::utils::errors::Result;
use crate::utils::logging::log_best_effort_failure;

enum Job {
    Task {
        step: &'static str,
        key: String,
        work: BoxFuture<'static, Result<()>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Counters describing what the queue has done so far
#[derive(Debug, Default)]
pub struct QueueStats {
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::Sender<Job>,
    stats: Arc<QueueStats>,
    worker: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl BackgroundQueue {
    /// Spawn the worker. Must be called inside a Tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(QueueStats::default());
        let worker = tokio::spawn(Self::run(receiver, stats.clone()));

        Self {
            sender,
            stats,
            worker: Arc::new(std::sync::Mutex::new(Some(worker))),
        }
    }

    async fn run(mut receiver: mpsc::Receiver<Job>, stats: Arc<QueueStats>) {
        while let Some(job) = receiver.recv().await {
            match job {
                Job::Task { step, key, work } => match work.await {
                    Ok(()) => {
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                        debug!(step = step, key = %key, "Background task completed");
                    }
                    Err(e) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        log_best_effort_failure(step, &key, &e);
                    }
                },
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("Background queue drained");
    }

    /// Enqueue a best-effort task. Returns false when it was dropped.
    pub fn submit<F>(&self, step: &'static str, key: impl Into<String>, work: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let key = key.into();
        match self.sender.try_send(Job::Task { step, key: key.clone(), work: Box::pin(work) }) {
            Ok(()) => true,
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                warn!(step = step, key = %key, reason = reason, "Dropped background task");
                false
            }
        }
    }

    /// Wait until every task submitted before this call has finished
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(Job::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Finish queued work and stop the worker
    pub async fn shutdown(&self) {
        self.flush().await;
        let handle = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!(
                completed = self.stats.completed(),
                failed = self.stats.failed(),
                dropped = self.stats.dropped(),
                "Background queue stopped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::StudyGroupError;

    #[tokio::test]
    async fn test_runs_and_counts_tasks() {
        let queue = BackgroundQueue::new(8);
        assert!(queue.submit("ok", "k1", async { Ok(()) }));
        assert!(queue.submit("fails", "k2", async { Err(StudyGroupError::TransientStore("boom".into())) }));
        queue.flush().await;

        assert_eq!(queue.stats().completed(), 1);
        assert_eq!(queue.stats().failed(), 1);
        assert_eq!(queue.stats().dropped(), 0);
    }

    #[tokio::test]
    async fn test_drops_when_full() {
        let queue = BackgroundQueue::new(1);
        let (release, gate) = oneshot::channel::<()>();

        // Occupies the worker until released
        queue.submit("blocker", "k", async move {
            let _ = gate.await;
            Ok(())
        });
        tokio::task::yield_now().await;

        let mut dropped = false;
        for _ in 0..4 {
            if !queue.submit("extra", "k", async { Ok(()) }) {
                dropped = true;
            }
        }
        assert!(dropped);
        assert!(queue.stats().dropped() > 0);

        let _ = release.send(());
        queue.flush().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let queue = BackgroundQueue::new(4);
        queue.shutdown().await;
        tokio::task::yield_now().await;
        assert!(!queue.submit("late", "k", async { Ok(()) }));
    }
}
