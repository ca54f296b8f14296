//! Async context stack.
//!
//! Every callback invocation is bracketed by [`AsyncContextStack::push`] and
//! [`AsyncContextStack::pop`]. The stack remembers the context that was
//! active before the push so nested callbacks unwind back to their caller's
//! context. Pops name the id they expect to remove; a mismatch means the
//! causal history is no longer trustworthy and is reported as
//! [`HostError::AsyncStackCorrupted`].
//!
//! The state lives in three [`FieldBuffer`]s so the host side can read the
//! current ids without calling back into this type:
//!
//! ```text
//! fields           [CHECK, STACK_LENGTH]
//! async_id_fields  [EXECUTION_ASYNC_ID, TRIGGER_ASYNC_ID, ASYNC_ID_COUNTER, DEFAULT_TRIGGER_ASYNC_ID]
//! stack            [exec0, trigger0, exec1, trigger1, ...]
//! ```

use tracing::{debug, trace};

use crate::error::{HostError, HostResult};
use crate::field_buffer::FieldBuffer;

/// Identifier of one asynchronous resource or callback invocation.
pub type AsyncId = f64;

/// "Unset / use default" sentinel.
pub const UNSET_ASYNC_ID: AsyncId = -1.0;

/// Id of the execution context that runs before the loop starts.
pub const BOOTSTRAP_ASYNC_ID: AsyncId = 1.0;

/// Slot layout of [`AsyncContextStack::fields`].
pub mod fields {
    pub const CHECK: usize = 0;
    pub const STACK_LENGTH: usize = 1;
    pub const COUNT: usize = 2;
}

/// Slot layout of [`AsyncContextStack::async_id_fields`].
pub mod id_fields {
    pub const EXECUTION_ASYNC_ID: usize = 0;
    pub const TRIGGER_ASYNC_ID: usize = 1;
    pub const ASYNC_ID_COUNTER: usize = 2;
    pub const DEFAULT_TRIGGER_ASYNC_ID: usize = 3;
    pub const COUNT: usize = 4;
}

/// An `(async_id, trigger_async_id)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsyncContext {
    pub async_id: AsyncId,
    pub trigger_async_id: AsyncId,
}

impl AsyncContext {
    pub fn new(async_id: AsyncId, trigger_async_id: AsyncId) -> Self {
        Self {
            async_id,
            trigger_async_id,
        }
    }
}

/// Array-backed stack of async contexts with corruption detection.
#[derive(Debug, Clone)]
pub struct AsyncContextStack {
    stack: FieldBuffer<f64>,
    fields: FieldBuffer<u32>,
    async_id_fields: FieldBuffer<f64>,
}

impl AsyncContextStack {
    /// Create a stack with room for `initial_capacity` saved contexts.
    ///
    /// With `check` enabled, pushes and pops validate their ids.
    pub fn new(initial_capacity: usize, check: bool) -> Self {
        let stack = FieldBuffer::new(initial_capacity.max(1) * 2);
        let fields = FieldBuffer::new(fields::COUNT);
        let async_id_fields = FieldBuffer::new(id_fields::COUNT);

        fields.set(fields::CHECK, u32::from(check));
        // -1 rather than 0: 0 means "missing context", -1 means "fall back
        // to the execution id".
        async_id_fields.set(id_fields::DEFAULT_TRIGGER_ASYNC_ID, UNSET_ASYNC_ID);
        async_id_fields.set(id_fields::ASYNC_ID_COUNTER, BOOTSTRAP_ASYNC_ID);

        Self {
            stack,
            fields,
            async_id_fields,
        }
    }

    /// Shared `[CHECK, STACK_LENGTH]` fields.
    pub fn fields(&self) -> &FieldBuffer<u32> {
        &self.fields
    }

    /// Shared id fields.
    pub fn async_id_fields(&self) -> &FieldBuffer<f64> {
        &self.async_id_fields
    }

    /// Whether push/pop validation is active.
    pub fn is_checking(&self) -> bool {
        self.fields.get(fields::CHECK) > 0
    }

    /// Drop one level of forced checking. Checking stays on while any
    /// level remains.
    pub fn no_force_checks(&self) {
        self.fields.update(fields::CHECK, |v| v.saturating_sub(1));
    }

    /// Number of saved contexts.
    pub fn depth(&self) -> usize {
        self.fields.get(fields::STACK_LENGTH) as usize
    }

    /// Number of contexts the backing storage holds before growing.
    pub fn capacity(&self) -> usize {
        self.stack.len() / 2
    }

    pub fn execution_async_id(&self) -> AsyncId {
        self.async_id_fields.get(id_fields::EXECUTION_ASYNC_ID)
    }

    pub fn trigger_async_id(&self) -> AsyncId {
        self.async_id_fields.get(id_fields::TRIGGER_ASYNC_ID)
    }

    /// The context in the current registers.
    pub fn current(&self) -> AsyncContext {
        AsyncContext::new(self.execution_async_id(), self.trigger_async_id())
    }

    /// Default trigger id, falling back to the execution id when unset.
    pub fn default_trigger_async_id(&self) -> AsyncId {
        let default = self.async_id_fields.get(id_fields::DEFAULT_TRIGGER_ASYNC_ID);
        if default < 0.0 {
            self.execution_async_id()
        } else {
            default
        }
    }

    /// Allocate the next async id. Ids are never reused.
    pub fn new_async_id(&self) -> AsyncId {
        self.async_id_fields
            .update(id_fields::ASYNC_ID_COUNTER, |counter| counter + 1.0)
    }

    /// Save the current registers and make `(async_id, trigger_async_id)`
    /// current.
    pub fn push(&self, async_id: AsyncId, trigger_async_id: AsyncId) -> HostResult<()> {
        if self.is_checking() {
            check_id("async_id", async_id, UNSET_ASYNC_ID)?;
            check_id("trigger_async_id", trigger_async_id, UNSET_ASYNC_ID)?;
        }

        let offset = self.depth();
        if offset * 2 >= self.stack.len() {
            self.grow();
        }
        self.stack.set(2 * offset, self.execution_async_id());
        self.stack.set(2 * offset + 1, self.trigger_async_id());
        self.fields.set(fields::STACK_LENGTH, offset as u32 + 1);
        self.async_id_fields
            .set(id_fields::EXECUTION_ASYNC_ID, async_id);
        self.async_id_fields
            .set(id_fields::TRIGGER_ASYNC_ID, trigger_async_id);

        trace!(async_id, trigger_async_id, depth = offset + 1, "push async context");
        Ok(())
    }

    /// Restore the context saved by the matching push.
    ///
    /// An empty stack returns `Ok(false)`: an earlier failure several
    /// callbacks deep may already have cleared it. Otherwise returns whether
    /// contexts remain after the pop.
    pub fn pop(&self, expected_async_id: AsyncId) -> HostResult<bool> {
        let depth = self.depth();
        if depth == 0 {
            return Ok(false);
        }

        let actual = self.execution_async_id();
        if self.is_checking() && actual != expected_async_id {
            return Err(HostError::AsyncStackCorrupted {
                actual,
                expected: expected_async_id,
            });
        }

        let offset = depth - 1;
        self.async_id_fields
            .set(id_fields::EXECUTION_ASYNC_ID, self.stack.get(2 * offset));
        self.async_id_fields
            .set(id_fields::TRIGGER_ASYNC_ID, self.stack.get(2 * offset + 1));
        self.fields.set(fields::STACK_LENGTH, offset as u32);

        trace!(async_id = expected_async_id, depth = offset, "pop async context");
        Ok(offset > 0)
    }

    /// Reset the registers to 0 and forget every saved context.
    pub fn clear(&self) {
        self.async_id_fields.set(id_fields::EXECUTION_ASYNC_ID, 0.0);
        self.async_id_fields.set(id_fields::TRIGGER_ASYNC_ID, 0.0);
        self.fields.set(fields::STACK_LENGTH, 0);
        debug!("async context stack cleared");
    }

    /// Saved contexts from the bottom of the stack up.
    pub fn saved_contexts(&self) -> Vec<AsyncContext> {
        let raw = self.stack.snapshot();
        raw.chunks_exact(2)
            .take(self.depth())
            .map(|pair| AsyncContext::new(pair[0], pair[1]))
            .collect()
    }

    fn grow(&self) {
        let new_len = (self.stack.len() * 2).max(2);
        self.stack.grow_to(new_len);
        debug!(capacity = new_len / 2, "async context stack grown");
    }
}

/// Scoped override of the default trigger id.
///
/// Installs a new default on creation and puts the previous one back
/// exactly once, on [`close`](Self::close) or drop.
#[must_use = "the previous default is restored as soon as the scope is dropped"]
pub struct DefaultTriggerScope {
    async_id_fields: FieldBuffer<f64>,
    previous: Option<AsyncId>,
}

impl DefaultTriggerScope {
    /// Install `default_trigger_async_id` as the default trigger id.
    pub fn new(stack: &AsyncContextStack, default_trigger_async_id: AsyncId) -> HostResult<Self> {
        if stack.is_checking() {
            check_id("default_trigger_async_id", default_trigger_async_id, 0.0)?;
        }

        let async_id_fields = stack.async_id_fields().clone();
        let previous = async_id_fields.get(id_fields::DEFAULT_TRIGGER_ASYNC_ID);
        async_id_fields.set(
            id_fields::DEFAULT_TRIGGER_ASYNC_ID,
            default_trigger_async_id,
        );

        Ok(Self {
            async_id_fields,
            previous: Some(previous),
        })
    }

    /// Restore the previous default. Later calls do nothing.
    pub fn close(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.async_id_fields
                .set(id_fields::DEFAULT_TRIGGER_ASYNC_ID, previous);
        }
    }
}

impl Drop for DefaultTriggerScope {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_id(field: &'static str, value: AsyncId, min: AsyncId) -> HostResult<()> {
    // `!(value >= min)` also rejects NaN.
    if !(value >= min) {
        return Err(HostError::InvalidAsyncId { field, value, min });
    }
    Ok(())
}

#[cfg(test)]
#[path = "async_context_tests.rs"]
mod tests;
