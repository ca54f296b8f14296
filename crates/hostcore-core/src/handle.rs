//! Native handles and their deferred closing.
//!
//! [`HandleCleanupQueue`] collects close requests that are batched until a
//! drain point (teardown or an explicit flush). [`PendingCloses`] models the
//! platform's asynchronous close primitive: a close is requested now and
//! completes on a later loop iteration. `waiting()` counts closes that have
//! been requested and not yet completed; teardown is only finished once it
//! reaches zero.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use tracing::trace;

use crate::error::{HostError, HostResult};

/// Identity of a native handle.
pub type HandleId = u64;

/// A native resource handle with a user data slot.
pub struct NativeHandle {
    id: HandleId,
    kind: &'static str,
    data: Option<Box<dyn Any>>,
    closing: bool,
}

impl NativeHandle {
    pub fn new(id: HandleId, kind: &'static str) -> Self {
        Self {
            id,
            kind,
            data: None,
            closing: false,
        }
    }

    /// Attach user data.
    pub fn with_data<T: Any>(mut self, data: T) -> Self {
        self.data = Some(Box::new(data));
        self
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Whether a close has been requested for this handle.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn set_data<T: Any>(&mut self, data: T) {
        self.data = Some(Box::new(data));
    }

    pub fn take_data(&mut self) -> Option<Box<dyn Any>> {
        self.data.take()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("has_data", &self.data.is_some())
            .field("closing", &self.closing)
            .finish()
    }
}

/// Callback invoked with a handle once its close completes.
pub type OnClose<C> = Box<dyn FnOnce(&mut C, NativeHandle)>;

/// A queued close request.
pub struct HandleCleanup<C> {
    pub handle: NativeHandle,
    pub finalizer: OnClose<C>,
}

/// Close requests waiting for the next drain point.
pub struct HandleCleanupQueue<C> {
    entries: Vec<HandleCleanup<C>>,
}

impl<C> Default for HandleCleanupQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HandleCleanupQueue<C> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Queue `handle` for cleanup. Nothing is closed until the queue drains.
    pub fn register(
        &mut self,
        handle: NativeHandle,
        finalizer: impl FnOnce(&mut C, NativeHandle) + 'static,
    ) {
        trace!(handle = handle.id, kind = handle.kind, "handle cleanup registered");
        self.entries.push(HandleCleanup {
            handle,
            finalizer: Box::new(finalizer),
        });
    }

    /// Take every queued request, in registration order.
    pub fn take_all(&mut self) -> Vec<HandleCleanup<C>> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(id, kind)` of every queued handle.
    pub fn handles(&self) -> impl Iterator<Item = (HandleId, &'static str)> + '_ {
        self.entries.iter().map(|e| (e.handle.id, e.handle.kind))
    }
}

/// A close that has been requested but not yet completed.
pub struct PendingClose<C> {
    handle: NativeHandle,
    on_close: OnClose<C>,
}

impl<C> PendingClose<C> {
    pub fn handle(&self) -> &NativeHandle {
        &self.handle
    }
}

/// In-progress closes and the outstanding-close counter.
pub struct PendingCloses<C> {
    waiting: u64,
    closing: VecDeque<PendingClose<C>>,
}

impl<C> Default for PendingCloses<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> PendingCloses<C> {
    pub fn new() -> Self {
        Self {
            waiting: 0,
            closing: VecDeque::new(),
        }
    }

    /// Closes requested and not yet completed.
    pub fn waiting(&self) -> u64 {
        self.waiting
    }

    pub fn has_pending(&self) -> bool {
        !self.closing.is_empty()
    }

    /// Request a close. `on_close` receives the handle, data slot intact,
    /// when the close completes.
    pub fn begin_close(
        &mut self,
        mut handle: NativeHandle,
        on_close: impl FnOnce(&mut C, NativeHandle) + 'static,
    ) {
        self.waiting += 1;
        handle.closing = true;
        trace!(handle = handle.id, kind = handle.kind, waiting = self.waiting, "close requested");
        self.closing.push_back(PendingClose {
            handle,
            on_close: Box::new(on_close),
        });
    }

    /// Closes ready to complete on this iteration.
    pub fn take_ready(&mut self) -> Vec<PendingClose<C>> {
        self.closing.drain(..).collect()
    }

    /// Account for a completed close and hand back the handle with its
    /// callback. The counter is decremented before the callback can run.
    pub fn finish(&mut self, pending: PendingClose<C>) -> HostResult<(NativeHandle, OnClose<C>)> {
        self.waiting = self
            .waiting
            .checked_sub(1)
            .ok_or(HostError::CounterUnderflow {
                counter: "handle cleanup waiting",
                current: 0,
                by: 1,
            })?;
        trace!(handle = pending.handle.id, waiting = self.waiting, "close completed");
        Ok((pending.handle, pending.on_close))
    }

    /// `(id, kind)` of every handle still closing.
    pub fn handles(&self) -> impl Iterator<Item = (HandleId, &'static str)> + '_ {
        self.closing.iter().map(|p| (p.handle.id, p.handle.kind))
    }
}
