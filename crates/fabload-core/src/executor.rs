//! Bounded executor: a fixed pool of workers fed from a bounded queue.
//!
//! Submission never blocks. When every queue slot is taken `submit` fails
//! with [`SubmitError::QueueFull`]; the caller decides whether that is fatal.
//! No ordering is guaranteed between separate submissions.
//!
//! Each task runs isolated from its worker: a task that panics is abandoned
//! and the worker moves on to the next one.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::task::{Task, run_isolated};

type TaskQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<Arc<dyn Task>>>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("executor queue is full ({capacity} slots)")]
    QueueFull { capacity: usize },

    #[error("executor is not running")]
    NotRunning,
}

/// Handles of a started pool.
/// - dropping `queue_tx` lets workers drain the queue and exit
/// - sending on `shutdown_tx` makes them exit after their current task
struct Running {
    queue_tx: mpsc::Sender<Arc<dyn Task>>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

pub struct BoundedExecutor {
    concurrency: usize,
    capacity: usize,
    running: Mutex<Option<Running>>,
}

impl BoundedExecutor {
    /// Both limits are raised to at least one.
    pub fn new(concurrency: usize, capacity: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            capacity: capacity.max(1),
            running: Mutex::new(None),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Spawn the workers. Must be called from within a tokio runtime.
    /// Starting a running executor does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            tracing::warn!("executor already running");
            return;
        }

        let (queue_tx, queue_rx) = mpsc::channel(self.capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue: TaskQueue = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let joins = (0..self.concurrency)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, queue, shutdown_rx))
            })
            .collect();

        tracing::debug!(
            concurrency = self.concurrency,
            capacity = self.capacity,
            "executor started"
        );
        *running = Some(Running {
            queue_tx,
            shutdown_tx,
            joins,
        });
    }

    /// Queue a task without waiting for a free slot.
    pub fn submit(&self, task: Arc<dyn Task>) -> Result<(), SubmitError> {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let Some(running) = running.as_ref() else {
            return Err(SubmitError::NotRunning);
        };

        running.queue_tx.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => SubmitError::NotRunning,
        })
    }

    /// Stop accepting tasks and wait for the workers to exit.
    ///
    /// With `wait_for_drain` every queued task still runs; without it workers
    /// finish their current task and queued tasks are dropped.
    pub async fn stop(&self, wait_for_drain: bool) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Running {
            queue_tx,
            shutdown_tx,
            joins,
        }) = running
        else {
            return;
        };

        if !wait_for_drain {
            // receivers may already be gone
            let _ = shutdown_tx.send(true);
        }
        drop(queue_tx);

        for join in joins {
            if let Err(err) = join.await {
                tracing::warn!(error = %err, "executor worker ended abnormally");
            }
        }
        drop(shutdown_tx);
        tracing::debug!(wait_for_drain, "executor stopped");
    }
}

async fn worker_loop(worker_id: usize, queue: TaskQueue, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // the queue lock is only held while waiting for the next task
        let next = {
            let mut rx = queue.lock().await;
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                task = rx.recv() => task,
            }
        };

        let Some(task) = next else {
            // queue closed and drained
            break;
        };

        tracing::trace!(worker_id, task = %task.id(), "running task");
        if let Err(reason) = run_isolated(Arc::clone(&task)).await {
            tracing::warn!(worker_id, task = %task.id(), %reason, "task panicked");
            task.abandon(&reason);
        }
    }
    tracing::trace!(worker_id, "worker exiting");
}
