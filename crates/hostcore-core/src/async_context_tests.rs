use super::*;

fn stack() -> AsyncContextStack {
    AsyncContextStack::new(16, true)
}

#[test]
fn test_initial_registers() {
    let stack = stack();
    assert_eq!(stack.execution_async_id(), 0.0);
    assert_eq!(stack.trigger_async_id(), 0.0);
    assert_eq!(stack.depth(), 0);
    assert!(stack.is_checking());
}

#[test]
fn test_lifo_restores_registers() {
    let stack = stack();
    let ids = [(5.0, 0.0), (7.0, 5.0), (9.0, 7.0), (11.0, 9.0)];

    for (async_id, trigger) in ids {
        stack.push(async_id, trigger).unwrap();
        assert_eq!(stack.current(), AsyncContext::new(async_id, trigger));
    }
    assert_eq!(stack.depth(), 4);

    for (i, (async_id, _)) in ids.iter().enumerate().rev() {
        let remaining = stack.pop(*async_id).unwrap();
        assert_eq!(remaining, i > 0);
        if i > 0 {
            assert_eq!(stack.execution_async_id(), ids[i - 1].0);
        }
    }

    assert_eq!(stack.current(), AsyncContext::new(0.0, 0.0));
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_mismatched_pop_is_corruption() {
    let stack = stack();
    stack.push(5.0, 0.0).unwrap();
    stack.push(7.0, 5.0).unwrap();

    let err = stack.pop(999.0).unwrap_err();
    assert_eq!(
        err,
        HostError::AsyncStackCorrupted {
            actual: 7.0,
            expected: 999.0
        }
    );
    assert!(err.is_fatal());
    // Nothing was popped.
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.execution_async_id(), 7.0);
}

#[test]
fn test_mismatch_tolerated_without_checking() {
    let stack = AsyncContextStack::new(4, false);
    stack.push(5.0, 0.0).unwrap();

    assert!(!stack.pop(999.0).unwrap());
    assert_eq!(stack.execution_async_id(), 0.0);
}

#[test]
fn test_pop_empty_stack_is_permissive() {
    let stack = stack();
    assert!(!stack.pop(3.0).unwrap());
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_push_rejects_ids_below_sentinel() {
    let stack = stack();
    let err = stack.push(-2.0, 0.0).unwrap_err();
    assert!(matches!(err, HostError::InvalidAsyncId { field: "async_id", .. }));
    assert!(stack.push(1.0, f64::NAN).is_err());
    assert_eq!(stack.depth(), 0);

    stack.push(UNSET_ASYNC_ID, UNSET_ASYNC_ID).unwrap();
    assert_eq!(stack.depth(), 1);
}

#[test]
fn test_stack_grows_by_doubling() {
    let stack = AsyncContextStack::new(2, true);
    assert_eq!(stack.capacity(), 2);

    for id in 1..=5 {
        stack.push(id as f64, 0.0).unwrap();
    }
    assert_eq!(stack.capacity(), 8);

    for id in (1..=5).rev() {
        stack.pop(id as f64).unwrap();
    }
    assert_eq!(stack.depth(), 0);
}

#[test]
fn test_saved_contexts_snapshot() {
    let stack = stack();
    stack.push(5.0, 1.0).unwrap();
    stack.push(7.0, 5.0).unwrap();

    assert_eq!(
        stack.saved_contexts(),
        vec![AsyncContext::new(0.0, 0.0), AsyncContext::new(5.0, 1.0)]
    );
}

#[test]
fn test_clear_resets_everything() {
    let stack = stack();
    stack.push(5.0, 1.0).unwrap();
    stack.push(7.0, 5.0).unwrap();

    stack.clear();
    assert_eq!(stack.depth(), 0);
    assert_eq!(stack.current(), AsyncContext::new(0.0, 0.0));
    assert!(!stack.pop(7.0).unwrap());
}

#[test]
fn test_new_async_id_is_monotonic() {
    let stack = stack();
    let first = stack.new_async_id();
    let second = stack.new_async_id();
    assert_eq!(first, BOOTSTRAP_ASYNC_ID + 1.0);
    assert!(second > first);
}

#[test]
fn test_no_force_checks_counts_down() {
    let stack = stack();
    stack.no_force_checks();
    assert!(!stack.is_checking());
    stack.no_force_checks();
    assert!(!stack.is_checking());
}

#[test]
fn test_default_trigger_falls_back_to_execution_id() {
    let stack = stack();
    stack.push(12.0, 3.0).unwrap();
    assert_eq!(stack.default_trigger_async_id(), 12.0);
}

#[test]
fn test_default_trigger_scope_restores_on_drop() {
    let stack = stack();
    {
        let _outer = DefaultTriggerScope::new(&stack, 4.0).unwrap();
        assert_eq!(stack.default_trigger_async_id(), 4.0);
        {
            let _inner = DefaultTriggerScope::new(&stack, 6.0).unwrap();
            assert_eq!(stack.default_trigger_async_id(), 6.0);
        }
        assert_eq!(stack.default_trigger_async_id(), 4.0);
    }
    assert_eq!(
        stack.async_id_fields().get(id_fields::DEFAULT_TRIGGER_ASYNC_ID),
        UNSET_ASYNC_ID
    );
}

#[test]
fn test_default_trigger_scope_close_is_idempotent() {
    let stack = stack();
    let mut outer = DefaultTriggerScope::new(&stack, 4.0).unwrap();
    let mut inner = DefaultTriggerScope::new(&stack, 6.0).unwrap();

    inner.close();
    assert_eq!(stack.default_trigger_async_id(), 4.0);
    inner.close();
    assert_eq!(stack.default_trigger_async_id(), 4.0);

    outer.close();
    drop(inner);
    drop(outer);
    assert_eq!(stack.default_trigger_async_id(), stack.execution_async_id());
}

#[test]
fn test_default_trigger_scope_restores_on_unwind() {
    let stack = stack();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scope = DefaultTriggerScope::new(&stack, 8.0).unwrap();
        panic!("callback failed");
    }));
    assert!(result.is_err());
    assert_eq!(
        stack.async_id_fields().get(id_fields::DEFAULT_TRIGGER_ASYNC_ID),
        UNSET_ASYNC_ID
    );
}

#[test]
fn test_default_trigger_scope_rejects_sentinel_when_checking() {
    let stack = stack();
    assert!(DefaultTriggerScope::new(&stack, UNSET_ASYNC_ID).is_err());

    let unchecked = AsyncContextStack::new(4, false);
    assert!(DefaultTriggerScope::new(&unchecked, UNSET_ASYNC_ID).is_ok());
}
