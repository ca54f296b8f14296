//! Handles, cleanup hooks and buffers on the host instance.

use hostcore_core::{
    CleanupHookToken, HandleId, HookKey, HostResult, NativeHandle, ResourceId, ScopedBuffer,
};

use crate::environment::Environment;

impl Environment {
    /// Create a handle with a fresh id.
    pub fn new_handle(&mut self, kind: &'static str) -> NativeHandle {
        NativeHandle::new(self.next_resource_id(), kind)
    }

    /// Queue `handle` for cleanup at the next drain point.
    pub fn register_handle_cleanup(
        &mut self,
        handle: NativeHandle,
        finalizer: impl FnOnce(&mut Self, NativeHandle) + 'static,
    ) {
        self.handle_cleanup_queue.register(handle, finalizer);
    }

    /// Start closing `handle`. `on_close` runs in the close phase of a
    /// later loop iteration with the handle and its data intact.
    pub fn close_handle(
        &mut self,
        handle: NativeHandle,
        on_close: impl FnOnce(&mut Self, NativeHandle) + 'static,
    ) {
        self.pending_closes.begin_close(handle, on_close);
    }

    /// Complete every close requested so far.
    pub(crate) fn run_close_phase(&mut self) -> HostResult<usize> {
        let ready = self.pending_closes.take_ready();
        let count = ready.len();
        for pending in ready {
            let (handle, on_close) = self.pending_closes.finish(pending)?;
            on_close(self, handle);
            self.metrics.record_handle_closed();
        }
        Ok(count)
    }

    /// `(id, kind)` of handles queued for cleanup or still closing.
    pub fn active_handles(&self) -> Vec<(HandleId, &'static str)> {
        self.handle_cleanup_queue
            .handles()
            .chain(self.pending_closes.handles())
            .collect()
    }

    /// Register a teardown finalizer for `(name, resource)`. Registering the
    /// same pair twice is a fatal contract violation.
    pub fn add_cleanup_hook(
        &mut self,
        name: &'static str,
        resource: ResourceId,
        finalizer: impl FnOnce(&mut Self) + 'static,
    ) -> HostResult<CleanupHookToken> {
        self.cleanup_hooks
            .add(HookKey::new(name, resource), finalizer)
    }

    /// Unregister by token. Absent hooks are ignored.
    pub fn remove_cleanup_hook(&mut self, token: CleanupHookToken) -> bool {
        self.cleanup_hooks.remove(token)
    }

    /// Unregister by `(name, resource)`. Absent hooks are ignored.
    pub fn remove_cleanup_hook_for(&mut self, name: &'static str, resource: ResourceId) -> bool {
        self.cleanup_hooks.remove_key(&HookKey::new(name, resource))
    }

    /// Visit every resource tracked through a cleanup hook.
    pub fn for_each_owned_resource(&self, visitor: impl FnMut(CleanupHookToken, &HookKey)) {
        self.cleanup_hooks.for_each_owned_resource(visitor);
    }

    /// Allocate a buffer from the host allocator. Failure is fatal.
    pub fn allocate_buffer(&self, size: usize) -> HostResult<ScopedBuffer> {
        ScopedBuffer::allocate(self.allocator.clone(), size)
    }

    /// Allocate a buffer the caller must check with
    /// [`ScopedBuffer::has_region`].
    pub fn allocate_buffer_unchecked(&self, size: usize) -> ScopedBuffer {
        ScopedBuffer::allocate_unchecked(self.allocator.clone(), size)
    }
}
