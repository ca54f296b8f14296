//! Single-owner memory regions.
//!
//! A [`ScopedBuffer`] owns at most one region obtained from a
//! [`HostAllocator`] and gives it back exactly once: on drop, or never if the
//! region was handed to a new owner through [`ScopedBuffer::release`].

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::trace;

use crate::allocator::HostAllocator;
use crate::error::{HostError, HostResult};

/// A region handed out by [`ScopedBuffer::release`].
///
/// The holder is now responsible for the memory: either turn it back into a
/// buffer with [`ScopedBuffer::from_raw`] or return it with [`RawRegion::free`].
#[must_use = "a released region leaks unless it is freed or adopted"]
pub struct RawRegion {
    ptr: NonNull<u8>,
    len: usize,
    allocator: Arc<dyn HostAllocator>,
}

impl RawRegion {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Give the memory back to the allocator it came from.
    pub fn free(self) {
        // SAFETY: the region is unique and sized `len` by construction.
        unsafe { self.allocator.free(self.ptr, self.len) }
    }
}

impl fmt::Debug for RawRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

/// Move-only buffer backed by a host allocator.
pub struct ScopedBuffer {
    allocator: Arc<dyn HostAllocator>,
    ptr: Option<NonNull<u8>>,
    len: usize,
}

// SAFETY: the buffer exclusively owns its region; the allocator is Send + Sync.
unsafe impl Send for ScopedBuffer {}

impl ScopedBuffer {
    /// A buffer owning nothing.
    pub fn empty(allocator: Arc<dyn HostAllocator>) -> Self {
        Self {
            allocator,
            ptr: None,
            len: 0,
        }
    }

    /// Allocate `size` zeroed bytes. Failure is a fatal `AllocationFailed`.
    pub fn allocate(allocator: Arc<dyn HostAllocator>, size: usize) -> HostResult<Self> {
        let buffer = Self::allocate_unchecked(allocator, size);
        if buffer.has_region() {
            Ok(buffer)
        } else {
            Err(HostError::AllocationFailed { size })
        }
    }

    /// Allocate `size` zeroed bytes. On failure the buffer owns no region and
    /// the caller must check [`has_region`](Self::has_region).
    pub fn allocate_unchecked(allocator: Arc<dyn HostAllocator>, size: usize) -> Self {
        let ptr = allocator.allocate(size);
        trace!(size, ok = ptr.is_some(), allocator = allocator.name(), "buffer allocated");
        let len = if ptr.is_some() { size } else { 0 };
        Self { allocator, ptr, len }
    }

    /// Adopt a region previously handed out by [`release`](Self::release).
    pub fn from_raw(region: RawRegion) -> Self {
        Self {
            allocator: region.allocator,
            ptr: Some(region.ptr),
            len: region.len,
        }
    }

    /// Whether the buffer currently owns a region (possibly zero-length).
    pub fn has_region(&self) -> bool {
        self.ptr.is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn allocator(&self) -> &Arc<dyn HostAllocator> {
        &self.allocator
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: the region is owned and holds `len` initialized bytes.
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self.ptr {
            // SAFETY: as above, and `&mut self` makes the access exclusive.
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    /// Resize to `new_len` bytes, keeping the common prefix and zeroing any
    /// growth. An empty buffer gets a fresh region. The previous pointer is
    /// invalid afterwards; failure is a fatal `ReallocationFailed`.
    pub fn resize(&mut self, new_len: usize) -> HostResult<()> {
        let moved = match self.ptr {
            // SAFETY: the region is owned and currently sized `len`.
            Some(ptr) => unsafe { self.allocator.reallocate(ptr, self.len, new_len) },
            None => self.allocator.allocate(new_len),
        };
        let Some(moved) = moved else {
            return Err(HostError::ReallocationFailed { size: new_len });
        };
        if self.ptr.is_some() && new_len > self.len {
            // SAFETY: `moved` spans `new_len` bytes; only the tail is written.
            unsafe { moved.as_ptr().add(self.len).write_bytes(0, new_len - self.len) };
        }
        trace!(old_len = self.len, new_len, "buffer resized");
        self.ptr = Some(moved);
        self.len = new_len;
        Ok(())
    }

    /// Hand the region to a new owner. The buffer is left empty and its drop
    /// does nothing. Returns `None` when there is nothing to release.
    pub fn release(&mut self) -> Option<RawRegion> {
        let ptr = self.ptr.take()?;
        let len = std::mem::take(&mut self.len);
        Some(RawRegion {
            ptr,
            len,
            allocator: self.allocator.clone(),
        })
    }

    /// Move the region out into a new buffer, leaving this one empty.
    pub fn take(&mut self) -> ScopedBuffer {
        ScopedBuffer {
            allocator: self.allocator.clone(),
            ptr: self.ptr.take(),
            len: std::mem::take(&mut self.len),
        }
    }

    /// Replace the contents with `source`'s region. The current region is
    /// freed before the new one is adopted.
    pub fn assign(&mut self, mut source: ScopedBuffer) {
        self.clear();
        self.allocator = source.allocator.clone();
        self.ptr = source.ptr.take();
        self.len = std::mem::take(&mut source.len);
    }

    /// Free the region now, leaving the buffer empty.
    pub fn clear(&mut self) {
        if let Some(ptr) = self.ptr.take() {
            // SAFETY: the region is owned and sized `len`; `take` prevents reuse.
            unsafe { self.allocator.free(ptr, self.len) };
            trace!(len = self.len, "buffer freed");
        }
        self.len = 0;
    }
}

impl Drop for ScopedBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for ScopedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedBuffer")
            .field("len", &self.len)
            .field("has_region", &self.has_region())
            .field("allocator", &self.allocator.name())
            .finish()
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
