//! Background work items.
//!
//! A [`ThreadPoolWork`] item runs its body on the worker pool and its
//! completion on the control thread. The item travels to a worker and back,
//! so it must be `Send`; completion receives `&mut Environment` and may
//! touch any host state.
//!
//! ```text
//! Idle ──schedule──▶ Scheduled ──▶ Running ──▶ Completed
//!                        │
//!                        └──cancel──▶ CancelRequested ──▶ Completed(cancelled)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use hostcore_core::HostResult;
use tokio_util::sync::CancellationToken;

use crate::environment::Environment;

/// Identity of a scheduled job.
pub type JobId = u64;

/// How a job ended, as seen by its completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkStatus {
    /// The body ran to completion.
    Completed,
    /// Cancelled before the body started; the body never ran.
    Cancelled,
    /// The body panicked.
    Panicked(String),
}

impl WorkStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, WorkStatus::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkStatus::Cancelled)
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkStatus::Completed => write!(f, "completed"),
            WorkStatus::Cancelled => write!(f, "cancelled"),
            WorkStatus::Panicked(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

/// Lifecycle state of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkState {
    Idle = 0,
    Scheduled = 1,
    Running = 2,
    CancelRequested = 3,
    Completed = 4,
}

impl WorkState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkState::Scheduled,
            2 => WorkState::Running,
            3 => WorkState::CancelRequested,
            4 => WorkState::Completed,
            _ => WorkState::Idle,
        }
    }
}

/// Unit of background work.
pub trait ThreadPoolWork: Send + 'static {
    /// Name reported by `active_requests`.
    fn name(&self) -> &str;

    /// Body, run on a worker thread. Must not touch host state. Long bodies
    /// should poll `cancel` and return early once it fires.
    fn do_thread_pool_work(&mut self, cancel: &CancellationToken);

    /// Completion, run on the control thread after the body returned (or
    /// was skipped by cancellation). The waiting-request count has already
    /// been released when this runs.
    fn after_thread_pool_work(
        self: Box<Self>,
        env: &mut Environment,
        status: WorkStatus,
    ) -> HostResult<()>;
}

/// Handle for observing and cancelling a scheduled job.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    id: JobId,
    state: Arc<AtomicU8>,
    token: CancellationToken,
}

impl WorkHandle {
    pub(crate) fn new(id: JobId) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(WorkState::Idle as u8)),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> WorkState {
        WorkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn set_state(&self, state: WorkState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Move `from` to `to` if the job is still in `from`.
    pub(crate) fn transition(&self, from: WorkState, to: WorkState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Try to stop the job. Returns `true` when the body was prevented from
    /// starting. A running body is only signalled through its cancellation
    /// token and this returns `false`. The completion fires either way.
    pub fn cancel(&self) -> bool {
        if self.transition(WorkState::Scheduled, WorkState::CancelRequested) {
            self.token.cancel();
            return true;
        }
        if self.state() == WorkState::Running {
            self.token.cancel();
        }
        false
    }
}

type DoWork<T> = Box<dyn FnOnce(&CancellationToken) -> T + Send>;
type AfterWork<T> = Box<dyn FnOnce(&mut Environment, WorkStatus, Option<T>) -> HostResult<()> + Send>;

/// [`ThreadPoolWork`] built from a pair of closures.
///
/// The body's return value is handed to the completion, or `None` when the
/// body did not finish.
pub struct FnWork<T> {
    name: String,
    do_work: Option<DoWork<T>>,
    after_work: AfterWork<T>,
    output: Option<T>,
}

impl<T: Send + 'static> FnWork<T> {
    pub fn new<D, A>(name: impl Into<String>, do_work: D, after_work: A) -> Self
    where
        D: FnOnce(&CancellationToken) -> T + Send + 'static,
        A: FnOnce(&mut Environment, WorkStatus, Option<T>) -> HostResult<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            do_work: Some(Box::new(do_work)),
            after_work: Box::new(after_work),
            output: None,
        }
    }
}

impl<T: Send + 'static> ThreadPoolWork for FnWork<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn do_thread_pool_work(&mut self, cancel: &CancellationToken) {
        if let Some(do_work) = self.do_work.take() {
            self.output = Some(do_work(cancel));
        }
    }

    fn after_thread_pool_work(
        self: Box<Self>,
        env: &mut Environment,
        status: WorkStatus,
    ) -> HostResult<()> {
        let this = *self;
        (this.after_work)(env, status, this.output)
    }
}

impl<T> fmt::Debug for FnWork<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork")
            .field("name", &self.name)
            .field("ran", &self.do_work.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_scheduled_job() {
        let handle = WorkHandle::new(1);
        handle.set_state(WorkState::Scheduled);
        assert!(handle.cancel());
        assert_eq!(handle.state(), WorkState::CancelRequested);
        assert!(handle.token().is_cancelled());
        // Body must not start after a successful cancel.
        assert!(!handle.transition(WorkState::Scheduled, WorkState::Running));
    }

    #[test]
    fn test_cancel_running_job_signals_only() {
        let handle = WorkHandle::new(2);
        handle.set_state(WorkState::Running);
        assert!(!handle.cancel());
        assert_eq!(handle.state(), WorkState::Running);
        assert!(handle.token().is_cancelled());
    }

    #[test]
    fn test_cancel_idle_or_completed_is_noop() {
        let handle = WorkHandle::new(3);
        assert!(!handle.cancel());
        handle.set_state(WorkState::Completed);
        assert!(!handle.cancel());
        assert!(!handle.token().is_cancelled());
    }

    #[test]
    fn test_fn_work_runs_body_once() {
        let mut work = FnWork::new("sum", |_| 2 + 2, |_, _, _| Ok(()));
        let token = CancellationToken::new();
        work.do_thread_pool_work(&token);
        work.do_thread_pool_work(&token);
        assert_eq!(work.output, Some(4));
        assert_eq!(work.name(), "sum");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(WorkStatus::Completed.to_string(), "completed");
        assert!(WorkStatus::Cancelled.is_cancelled());
        assert_eq!(WorkStatus::Panicked("boom".into()).to_string(), "panicked: boom");
    }
}
