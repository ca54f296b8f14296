//! Background jobs on the host instance.

use hostcore_core::{AsyncContext, HostResult, RequestGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::environment::Environment;
use crate::pool::Completion;
use crate::work::{FnWork, ThreadPoolWork, WorkHandle, WorkStatus};

/// A submitted job whose completion has not been consumed.
pub(crate) struct InFlightJob {
    pub(crate) name: String,
    pub(crate) context: AsyncContext,
    pub(crate) handle: WorkHandle,
    pub(crate) guard: RequestGuard,
}

impl Environment {
    /// Submit `item` to the worker pool.
    ///
    /// Counts one waiting request until the completion has been consumed.
    /// A rejected submission releases that count before returning.
    pub fn schedule_work(&mut self, item: Box<dyn ThreadPoolWork>) -> HostResult<WorkHandle> {
        let id = self.next_job_id;
        self.next_job_id += 1;
        let name = item.name().to_string();
        let context = self.new_async_context();
        let guard = self.waiting_requests.acquire();
        let handle = WorkHandle::new(id);

        if let Err(e) = self.pool.submit(item, handle.clone()) {
            drop(guard);
            warn!(job = id, name = %name, error = %e, "background job rejected");
            return Err(e);
        }

        self.metrics.record_job_scheduled();
        debug!(job = id, name = %name, waiting = self.waiting_requests.count(), "background job scheduled");
        self.in_flight.insert(
            id,
            InFlightJob {
                name,
                context,
                handle: handle.clone(),
                guard,
            },
        );
        Ok(handle)
    }

    /// Closure form of [`schedule_work`](Self::schedule_work).
    pub fn submit_background_job<T, D, A>(
        &mut self,
        name: impl Into<String>,
        do_work: D,
        after_work: A,
    ) -> HostResult<WorkHandle>
    where
        T: Send + 'static,
        D: FnOnce(&CancellationToken) -> T + Send + 'static,
        A: FnOnce(&mut Environment, WorkStatus, Option<T>) -> HostResult<()> + Send + 'static,
    {
        self.schedule_work(Box::new(FnWork::new(name, do_work, after_work)))
    }

    /// Best-effort cancellation. Returns whether the body was prevented
    /// from starting. The completion runs either way.
    pub fn cancel_background_job(&self, handle: &WorkHandle) -> bool {
        let cancelled = handle.cancel();
        debug!(job = handle.id(), cancelled, "background job cancel requested");
        cancelled
    }

    /// Request cancellation of every in-flight job.
    pub(crate) fn cancel_all_jobs(&self) -> usize {
        self.in_flight
            .values()
            .filter(|job| job.handle.cancel())
            .count()
    }

    /// Consume one completion: release the waiting request, then run the
    /// item's completion in its own context.
    pub(crate) fn complete_job(&mut self, completion: Completion) -> HostResult<()> {
        let Completion { id, item, status } = completion;
        let Some(mut job) = self.in_flight.remove(&id) else {
            warn!(job = id, "completion for unknown job");
            return Ok(());
        };
        job.guard.release()?;

        match &status {
            WorkStatus::Completed => self.metrics.record_job_completed(),
            WorkStatus::Cancelled => self.metrics.record_job_cancelled(),
            WorkStatus::Panicked(msg) => {
                warn!(job = id, name = %job.name, panic = %msg, "background job body panicked");
                self.metrics.record_job_failed();
            }
        }
        debug!(job = id, name = %job.name, %status, "background job finished");

        let Some(item) = item else {
            error!(job = id, name = %job.name, "background job lost before completion");
            return Ok(());
        };
        let context = job.context;
        self.run_in_context(context.async_id, context.trigger_async_id, |env| {
            item.after_thread_pool_work(env, status)
        })
    }

    /// Names of jobs submitted and not yet completed.
    pub fn active_requests(&self) -> Vec<String> {
        let mut jobs: Vec<_> = self.in_flight.iter().collect();
        jobs.sort_by_key(|(id, _)| **id);
        jobs.into_iter().map(|(_, job)| job.name.clone()).collect()
    }
}
