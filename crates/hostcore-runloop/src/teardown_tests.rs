use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc;

use hostcore_config::HostConfig;
use hostcore_core::NativeHandle;

use super::*;
use crate::work::WorkStatus;

fn env() -> Environment {
    Environment::new(HostConfig::default()).unwrap()
}

type Log = Rc<RefCell<Vec<String>>>;

fn hook(log: &Log, name: &'static str) -> impl FnOnce(&mut Environment) + 'static {
    let log = log.clone();
    move |_| log.borrow_mut().push(name.to_string())
}

#[test]
fn test_hooks_run_newest_first() {
    let mut env = env();
    let log: Log = Rc::default();
    env.add_cleanup_hook("h1", 1, hook(&log, "H1")).unwrap();
    env.add_cleanup_hook("h2", 2, hook(&log, "H2")).unwrap();
    env.add_cleanup_hook("h3", 3, hook(&log, "H3")).unwrap();

    assert_eq!(env.run_cleanup().unwrap(), 3);
    assert_eq!(*log.borrow(), vec!["H3", "H2", "H1"]);
    assert_eq!(env.metrics().snapshot().hooks_run, 3);
}

#[test]
fn test_hook_registered_during_teardown_runs() {
    let mut env = env();
    let log: Log = Rc::default();

    let l = log.clone();
    env.add_cleanup_hook("parent", 1, move |env| {
        l.borrow_mut().push("parent".into());
        let child = hook(&l, "child");
        env.add_cleanup_hook("child", 2, child).unwrap();
    })
    .unwrap();

    assert_eq!(env.run_cleanup().unwrap(), 2);
    assert_eq!(*log.borrow(), vec!["parent", "child"]);
}

#[test]
fn test_hook_removed_by_earlier_hook_is_skipped() {
    let mut env = env();
    let log: Log = Rc::default();

    let older = env.add_cleanup_hook("older", 1, hook(&log, "older")).unwrap();
    let l = log.clone();
    env.add_cleanup_hook("newer", 2, move |env| {
        l.borrow_mut().push("newer".into());
        assert!(env.remove_cleanup_hook(older));
    })
    .unwrap();

    assert_eq!(env.run_cleanup().unwrap(), 1);
    assert_eq!(*log.borrow(), vec!["newer"]);
}

#[test]
fn test_handle_cleanup_queue_drained_and_closed() {
    let mut env = env();
    let log: Log = Rc::default();

    let handle = env.new_handle("tcp").with_data(7u32);
    let l = log.clone();
    env.register_handle_cleanup(handle, move |env, handle| {
        l.borrow_mut().push(format!("finalize {}", handle.kind()));
        let l2 = l.clone();
        env.close_handle(handle, move |_, handle: NativeHandle| {
            l2.borrow_mut()
                .push(format!("closed {:?}", handle.data::<u32>()));
        });
    });

    env.run_cleanup().unwrap();
    assert_eq!(*log.borrow(), vec!["finalize tcp", "closed Some(7)"]);
    assert_eq!(env.handle_cleanup_waiting(), 0);
    assert!(env.active_handles().is_empty());
}

#[test]
fn test_hook_closing_handle_waits_for_close() {
    let mut env = env();
    let log: Log = Rc::default();

    let l = log.clone();
    env.add_cleanup_hook("timer", 1, move |env| {
        let handle = env.new_handle("timer");
        let l2 = l.clone();
        env.close_handle(handle, move |_, _| l2.borrow_mut().push("timer closed".into()));
    })
    .unwrap();
    env.add_cleanup_hook("last", 2, hook(&log, "last")).unwrap();

    env.run_cleanup().unwrap();
    assert_eq!(*log.borrow(), vec!["last", "timer closed"]);
    assert_eq!(env.handle_cleanup_waiting(), 0);
}

#[test]
fn test_in_flight_jobs_cancelled_and_accounted() {
    let mut config = HostConfig::default();
    config.workers.max_workers = 1;
    let mut env = Environment::new(config).unwrap();
    let (release, gate) = mpsc::channel::<()>();

    let statuses = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let s1 = statuses.clone();
    let running = env
        .submit_background_job(
            "running",
            move |_| {
                let _ = gate.recv();
            },
            move |_, status, _| {
                s1.lock().push(status);
                Ok(())
            },
        )
        .unwrap();
    while running.state() != crate::work::WorkState::Running {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    for _ in 0..3 {
        let s = statuses.clone();
        env.submit_background_job(
            "queued",
            |_| (),
            move |_, status, _| {
                s.lock().push(status);
                Ok(())
            },
        )
        .unwrap();
    }
    assert_eq!(env.waiting_requests(), 4);

    // Queued jobs are cancelled while the first still holds the only worker.
    let releaser = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(50));
        let _ = release.send(());
    });
    env.run_cleanup().unwrap();
    releaser.join().unwrap();

    let statuses = statuses.lock();
    assert_eq!(statuses.len(), 4);
    assert_eq!(
        statuses.iter().filter(|s| **s == WorkStatus::Cancelled).count(),
        3
    );
    assert_eq!(env.waiting_requests(), 0);
}

#[test]
fn test_submission_after_teardown_rejected() {
    let mut env = env();
    env.run_cleanup().unwrap();

    let err = env
        .submit_background_job("late", |_| (), |_, _, _| Ok(()))
        .unwrap_err();
    assert!(matches!(err, hostcore_core::HostError::SubmissionRejected { .. }));
    assert_eq!(env.waiting_requests(), 0);
}

fn reclose(env: &mut Environment, _handle: NativeHandle) {
    let next = env.new_handle("respawn");
    env.close_handle(next, reclose);
}

#[test]
fn test_close_that_never_settles_stalls_teardown() {
    let mut config = HostConfig::default();
    config.teardown.max_drain_iterations = 3;
    let mut env = Environment::new(config).unwrap();

    let handle = env.new_handle("respawn");
    env.close_handle(handle, reclose);

    let err = env.run_cleanup().unwrap_err();
    assert_eq!(
        err,
        hostcore_core::HostError::TeardownStalled {
            waiting_requests: 0,
            waiting_closes: 1,
        }
    );
    assert!(!err.is_fatal());
}
