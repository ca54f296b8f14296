use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;

use hostcore_config::WorkerConfig;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::environment::Environment;

struct Counting {
    runs: Arc<AtomicUsize>,
    gate: Option<std_mpsc::Receiver<()>>,
    panic: bool,
}

impl Counting {
    fn new(runs: Arc<AtomicUsize>) -> Self {
        Self {
            runs,
            gate: None,
            panic: false,
        }
    }
}

impl ThreadPoolWork for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn do_thread_pool_work(&mut self, _cancel: &CancellationToken) {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv();
        }
        if self.panic {
            panic!("body failed");
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
    }

    fn after_thread_pool_work(
        self: Box<Self>,
        _env: &mut Environment,
        _status: WorkStatus,
    ) -> HostResult<()> {
        Ok(())
    }
}

fn pool(max_workers: usize, queue_capacity: usize) -> WorkerPool {
    WorkerPool::new(&WorkerConfig {
        max_workers,
        queue_capacity,
    })
    .unwrap()
}

#[test]
fn test_job_runs_and_completes() {
    let mut pool = pool(2, 16);
    let runs = Arc::new(AtomicUsize::new(0));
    let handle = WorkHandle::new(1);

    pool.submit(Box::new(Counting::new(runs.clone())), handle.clone())
        .unwrap();
    assert_eq!(pool.in_flight(), 1);

    let completion = pool.wait_completion().unwrap();
    assert_eq!(completion.id, 1);
    assert_eq!(completion.status, WorkStatus::Completed);
    assert!(completion.item.is_some());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), WorkState::Completed);
    assert_eq!(pool.in_flight(), 0);
    assert!(pool.wait_completion().is_none());
}

#[test]
fn test_cancel_queued_job_skips_body() {
    let mut pool = pool(1, 16);
    let runs = Arc::new(AtomicUsize::new(0));

    // Occupy the only worker until released.
    let (release, gate) = std_mpsc::channel();
    let mut blocker = Counting::new(runs.clone());
    blocker.gate = Some(gate);
    let running = WorkHandle::new(1);
    pool.submit(Box::new(blocker), running.clone()).unwrap();
    while running.state() != WorkState::Running {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    let queued = WorkHandle::new(2);
    pool.submit(Box::new(Counting::new(runs.clone())), queued.clone())
        .unwrap();
    assert!(queued.cancel());

    let first = pool.wait_completion().unwrap();
    assert_eq!(first.id, 2);
    assert_eq!(first.status, WorkStatus::Cancelled);

    release.send(()).unwrap();
    let second = pool.wait_completion().unwrap();
    assert_eq!(second.id, 1);
    assert_eq!(second.status, WorkStatus::Completed);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_body_reports_status() {
    let mut pool = pool(1, 16);
    let mut item = Counting::new(Arc::new(AtomicUsize::new(0)));
    item.panic = true;
    pool.submit(Box::new(item), WorkHandle::new(7)).unwrap();

    let completion = pool.wait_completion().unwrap();
    assert_eq!(completion.status, WorkStatus::Panicked("body failed".to_string()));
    assert!(completion.item.is_some());
}

#[test]
fn test_queue_capacity_rejects() {
    let mut pool = pool(1, 1);
    let runs = Arc::new(AtomicUsize::new(0));
    pool.submit(Box::new(Counting::new(runs.clone())), WorkHandle::new(1))
        .unwrap();

    let err = pool
        .submit(Box::new(Counting::new(runs)), WorkHandle::new(2))
        .unwrap_err();
    assert!(matches!(err, HostError::SubmissionRejected { ref reason, .. } if reason == "queue full"));
    assert!(pool.wait_completion().is_some());
}

#[test]
fn test_submit_after_shutdown_rejected() {
    let mut pool = pool(1, 4);
    pool.shutdown();
    assert!(!pool.is_running());

    let err = pool
        .submit(
            Box::new(Counting::new(Arc::new(AtomicUsize::new(0)))),
            WorkHandle::new(1),
        )
        .unwrap_err();
    assert!(matches!(err, HostError::SubmissionRejected { .. }));
    assert!(!err.is_fatal());
}
