//! Host allocators.
//!
//! [`ScopedBuffer`](crate::ScopedBuffer) obtains and returns memory through a
//! [`HostAllocator`] owned by the host instance. [`SystemAllocator`] goes
//! straight to the global allocator; [`TrackingAllocator`] records every live
//! region so that leaks and double frees surface during development.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

/// Memory source for host buffers.
///
/// Regions are byte-aligned. `allocate` returns zero-initialized memory.
/// Zero-sized requests are valid and yield a real, freeable region.
pub trait HostAllocator: Send + Sync + fmt::Debug {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Allocate `size` zeroed bytes, or `None` when memory is unavailable.
    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// Move a region to a new size. Bytes past `old_size` are unspecified.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with a current size of `old_size`.
    /// On success the old pointer must no longer be used.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>>;

    /// Return a region.
    ///
    /// # Safety
    ///
    /// `ptr` must come from this allocator with a current size of `size`, and
    /// must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

fn layout_for(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), 1).ok()
}

/// Allocator backed by the global Rust allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl HostAllocator for SystemAllocator {
    fn name(&self) -> &'static str {
        "system"
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let layout = layout_for(size)?;
        // SAFETY: the layout has a non-zero size.
        NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let old = layout_for(old_size)?;
        layout_for(new_size)?;
        // SAFETY: the caller guarantees `ptr` was allocated with `old`.
        NonNull::new(unsafe { alloc::realloc(ptr.as_ptr(), old, new_size.max(1)) })
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        if let Some(layout) = layout_for(size) {
            // SAFETY: the caller guarantees `ptr` was allocated with `layout`.
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
        }
    }
}

/// Point-in-time allocator statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_allocations: usize,
    pub live_bytes: usize,
    pub total_allocations: u64,
    pub total_frees: u64,
    pub failed_allocations: u64,
}

/// Debugging allocator that tracks every live region.
///
/// Freeing or reallocating a region it does not know about (never allocated
/// here, already freed, or freed with the wrong size) is a contract violation
/// and panics. With a byte limit configured, requests that would push live
/// bytes past it fail like an out-of-memory condition.
pub struct TrackingAllocator {
    inner: SystemAllocator,
    live: Mutex<HashMap<usize, usize>>,
    limit_bytes: Option<usize>,
    total_allocations: AtomicU64,
    total_frees: AtomicU64,
    failed_allocations: AtomicU64,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(limit_bytes: Option<usize>) -> Self {
        Self {
            inner: SystemAllocator,
            live: Mutex::new(HashMap::new()),
            limit_bytes,
            total_allocations: AtomicU64::new(0),
            total_frees: AtomicU64::new(0),
            failed_allocations: AtomicU64::new(0),
        }
    }

    pub fn limit_bytes(&self) -> Option<usize> {
        self.limit_bytes
    }

    pub fn stats(&self) -> AllocatorStats {
        let live = self.live.lock();
        AllocatorStats {
            live_allocations: live.len(),
            live_bytes: live.values().sum(),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            total_frees: self.total_frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }

    /// Whether `ptr` is a live region of this allocator.
    pub fn is_live(&self, ptr: NonNull<u8>) -> bool {
        self.live.lock().contains_key(&(ptr.as_ptr() as usize))
    }

    fn within_limit(&self, live: &HashMap<usize, usize>, extra: usize) -> bool {
        match self.limit_bytes {
            Some(limit) => live.values().sum::<usize>().saturating_add(extra) <= limit,
            None => true,
        }
    }

    fn fail(&self, size: usize) -> Option<NonNull<u8>> {
        self.failed_allocations.fetch_add(1, Ordering::Relaxed);
        warn!(size, limit = ?self.limit_bytes, "tracking allocator refused request");
        None
    }

    fn check_owned(live: &HashMap<usize, usize>, ptr: NonNull<u8>, size: usize) {
        match live.get(&(ptr.as_ptr() as usize)) {
            Some(&recorded) if recorded == size => {}
            Some(&recorded) => panic!(
                "region {:p} released with size {size}, allocated with {recorded}",
                ptr.as_ptr()
            ),
            None => panic!("region {:p} is not a live allocation", ptr.as_ptr()),
        }
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackingAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackingAllocator")
            .field("limit_bytes", &self.limit_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

impl HostAllocator for TrackingAllocator {
    fn name(&self) -> &'static str {
        "tracking"
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let mut live = self.live.lock();
        if !self.within_limit(&live, size) {
            drop(live);
            return self.fail(size);
        }
        let Some(ptr) = self.inner.allocate(size) else {
            drop(live);
            return self.fail(size);
        };
        live.insert(ptr.as_ptr() as usize, size);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        trace!(size, ptr = ?ptr.as_ptr(), "tracked allocation");
        Some(ptr)
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        let mut live = self.live.lock();
        Self::check_owned(&live, ptr, old_size);
        if new_size > old_size && !self.within_limit(&live, new_size - old_size) {
            drop(live);
            return self.fail(new_size);
        }
        // SAFETY: ownership and size were just verified against the table.
        let Some(moved) = (unsafe { self.inner.reallocate(ptr, old_size, new_size) }) else {
            drop(live);
            return self.fail(new_size);
        };
        live.remove(&(ptr.as_ptr() as usize));
        live.insert(moved.as_ptr() as usize, new_size);
        trace!(old_size, new_size, "tracked reallocation");
        Some(moved)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, size: usize) {
        let mut live = self.live.lock();
        Self::check_owned(&live, ptr, size);
        live.remove(&(ptr.as_ptr() as usize));
        self.total_frees.fetch_add(1, Ordering::Relaxed);
        // SAFETY: ownership and size were just verified against the table.
        unsafe { self.inner.free(ptr, size) }
    }
}

impl Drop for TrackingAllocator {
    fn drop(&mut self) {
        let live = self.live.get_mut();
        if !live.is_empty() {
            warn!(
                live_allocations = live.len(),
                live_bytes = live.values().sum::<usize>(),
                "tracking allocator dropped with live regions"
            );
        }
    }
}
