//! Bounded background worker pool.
//!
//! Jobs run on a dedicated multi-threaded tokio runtime. A semaphore bounds
//! how many bodies run at once; each body runs on the blocking pool so it
//! may do synchronous work. Completions come back over a channel and are
//! consumed on the control thread only, exactly once each.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use hostcore_config::WorkerConfig;
use hostcore_core::{HostError, HostResult};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::work::{JobId, ThreadPoolWork, WorkHandle, WorkState, WorkStatus};

/// A finished job, delivered to the control thread.
pub struct Completion {
    pub id: JobId,
    /// The item, handed back for its completion. `None` only when the
    /// blocking task was lost by the runtime.
    pub item: Option<Box<dyn ThreadPoolWork>>,
    pub status: WorkStatus,
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("id", &self.id)
            .field("has_item", &self.item.is_some())
            .field("status", &self.status)
            .finish()
    }
}

/// Worker pool for background job bodies.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    queue_capacity: usize,
    submitted: usize,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl WorkerPool {
    /// Start a pool with `max_workers` concurrent bodies.
    pub fn new(config: &WorkerConfig) -> std::io::Result<Self> {
        let max_workers = config.max_workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(max_workers)
            .max_blocking_threads(max_workers)
            .thread_name("hostcore-worker")
            .enable_all()
            .build()?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        info!(max_workers, queue_capacity = config.queue_capacity, "Worker pool started");
        Ok(Self {
            runtime: Some(runtime),
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            queue_capacity: config.queue_capacity,
            submitted: 0,
            completions_tx,
            completions_rx,
        })
    }

    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Jobs submitted whose completion has not been taken yet.
    pub fn in_flight(&self) -> usize {
        self.submitted
    }

    /// Number of idle workers.
    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Hand `item` to a worker. Returns immediately.
    ///
    /// Rejected when the pool is shut down or `queue_capacity` jobs are
    /// already in flight; the item is dropped and its completion never runs.
    pub fn submit(&mut self, item: Box<dyn ThreadPoolWork>, handle: WorkHandle) -> HostResult<()> {
        let reject = |reason: &str| HostError::SubmissionRejected {
            job: item.name().to_string(),
            reason: reason.to_string(),
        };
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(reject("pool shut down"));
        };
        if self.submitted >= self.queue_capacity {
            return Err(reject("queue full"));
        }

        let id = handle.id();
        let semaphore = self.semaphore.clone();
        let tx = self.completions_tx.clone();
        handle.set_state(WorkState::Scheduled);
        debug!(job = id, name = item.name(), "job submitted");

        runtime.spawn(async move {
            let token = handle.token().clone();
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };

            let (item, status) = match permit {
                Some(permit) if handle.transition(WorkState::Scheduled, WorkState::Running) => {
                    let ran = tokio::task::spawn_blocking(move || {
                        let mut item = item;
                        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                            item.do_thread_pool_work(&token)
                        }));
                        let status = match outcome {
                            Ok(()) => WorkStatus::Completed,
                            Err(payload) => WorkStatus::Panicked(panic_message(payload.as_ref())),
                        };
                        (item, status)
                    })
                    .await;
                    drop(permit);
                    match ran {
                        Ok((item, status)) => (Some(item), status),
                        Err(e) => (None, WorkStatus::Panicked(e.to_string())),
                    }
                }
                _ => (Some(item), WorkStatus::Cancelled),
            };

            handle.set_state(WorkState::Completed);
            if tx.send(Completion { id, item, status }).is_err() {
                warn!(job = id, "completion dropped, pool receiver is gone");
            }
        });

        self.submitted += 1;
        Ok(())
    }

    /// Take one completion without blocking.
    pub fn try_completion(&mut self) -> Option<Completion> {
        let completion = self.completions_rx.try_recv().ok()?;
        self.submitted = self.submitted.saturating_sub(1);
        Some(completion)
    }

    /// Block the control thread until a completion arrives. Returns `None`
    /// right away when nothing is in flight.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_completion(&mut self) -> Option<Completion> {
        if self.submitted == 0 {
            return None;
        }
        let completion = self.completions_rx.blocking_recv()?;
        self.submitted = self.submitted.saturating_sub(1);
        Some(completion)
    }

    /// Refuse further submissions and stop the runtime. Completions not yet
    /// taken are lost, so drain before shutting down.
    pub fn shutdown(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        self.semaphore.close();
        if self.submitted > 0 {
            warn!(in_flight = self.submitted, "worker pool shut down with jobs in flight");
        }
        runtime.shutdown_timeout(Duration::from_secs(1));
        info!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("running", &self.is_running())
            .field("max_workers", &self.max_workers)
            .field("in_flight", &self.submitted)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
