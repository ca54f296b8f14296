use super::*;

#[test]
fn test_counter_balance() {
    let info = ImmediateInfo::new();
    let ops: [(bool, u32); 6] = [(true, 3), (false, 1), (true, 2), (false, 2), (true, 1), (false, 3)];

    let mut expected: i64 = 0;
    for (inc, n) in ops {
        if inc {
            info.count_inc(n);
            expected += i64::from(n);
        } else {
            info.count_dec(n).unwrap();
            expected -= i64::from(n);
        }
        assert_eq!(i64::from(info.count()), expected);
    }
    assert_eq!(info.count(), 0);
}

#[test]
fn test_count_underflow_is_reported() {
    let info = ImmediateInfo::new();
    info.count_inc(1);

    let err = info.count_dec(2).unwrap_err();
    assert!(matches!(err, HostError::CounterUnderflow { current: 1, by: 2, .. }));
    assert!(err.is_fatal());
    assert_eq!(info.count(), 1);
}

#[test]
fn test_ref_count_transitions() {
    let info = ImmediateInfo::new();
    assert!(!info.handle().is_active());

    assert_eq!(info.ref_count_inc(1), RefTransition::Activated);
    assert!(info.handle().is_active());
    assert_eq!(info.ref_count_inc(2), RefTransition::Unchanged);

    assert_eq!(info.ref_count_dec(2).unwrap(), RefTransition::Unchanged);
    assert!(info.handle().is_active());
    assert_eq!(info.ref_count_dec(1).unwrap(), RefTransition::Deactivated);
    assert!(!info.handle().is_active());
    assert_eq!(info.handle().transitions(), 2);
}

#[test]
fn test_ref_count_inc_by_zero_does_not_activate() {
    let info = ImmediateInfo::new();
    assert_eq!(info.ref_count_inc(0), RefTransition::Unchanged);
    assert!(!info.handle().is_active());
}

#[test]
fn test_has_outstanding_flag() {
    let info = ImmediateInfo::new();
    assert!(!info.has_outstanding());
    info.set_has_outstanding(true);
    assert!(info.has_outstanding());
    assert_eq!(info.fields().get(immediate_fields::HAS_OUTSTANDING), 1);
}

#[test]
fn test_guard_releases_on_drop() {
    let info = ImmediateInfo::new();
    {
        let _kept = info.hold(true);
        let _weak = info.hold(false);
        assert_eq!(info.count(), 2);
        assert_eq!(info.ref_count(), 1);
        assert!(info.handle().is_active());
    }
    assert_eq!(info.count(), 0);
    assert_eq!(info.ref_count(), 0);
    assert!(!info.handle().is_active());
}

#[test]
fn test_guard_keep_alive_toggle() {
    let info = ImmediateInfo::new();
    let mut guard = info.hold(false);
    assert_eq!(info.ref_count(), 0);

    assert_eq!(guard.set_keep_alive(true).unwrap(), RefTransition::Activated);
    assert_eq!(guard.set_keep_alive(true).unwrap(), RefTransition::Unchanged);
    assert_eq!(info.ref_count(), 1);

    assert_eq!(guard.set_keep_alive(false).unwrap(), RefTransition::Deactivated);
    drop(guard);
    assert_eq!(info.count(), 0);
    assert_eq!(info.ref_count(), 0);
}

#[test]
fn test_tick_flags() {
    let tick = TickInfo::new();
    assert!(!tick.has_tick_scheduled());
    assert!(!tick.has_rejection_to_warn());

    tick.set_has_tick_scheduled(true);
    tick.set_has_rejection_to_warn(true);
    assert!(tick.has_tick_scheduled());
    assert!(tick.has_rejection_to_warn());
    assert_eq!(tick.fields().snapshot(), vec![1, 1]);
}

#[test]
fn test_waiting_requests_guard() {
    let requests = WaitingRequests::new();
    let first = requests.acquire();
    let mut second = requests.acquire();
    assert_eq!(requests.count(), 2);

    second.release().unwrap();
    second.release().unwrap();
    assert_eq!(requests.count(), 1);

    drop(second);
    assert_eq!(requests.count(), 1);
    drop(first);
    assert_eq!(requests.count(), 0);
}

#[test]
fn test_request_guard_crosses_threads() {
    let requests = WaitingRequests::new();
    let guard = requests.acquire();

    std::thread::spawn(move || drop(guard)).join().unwrap();
    assert_eq!(requests.count(), 0);
}
