//! # HostCore Core
//!
//! Bookkeeping primitives for a single-threaded execution host that hands
//! work to native resources and must keep causal context across nested
//! callbacks.
//!
//! ## Components
//!
//! - [`FieldBuffer`]: shared, growable array of numeric fields
//! - [`AsyncContextStack`]: `(async_id, trigger_async_id)` stack with corruption detection
//! - [`DefaultTriggerScope`]: scoped override of the default trigger id
//! - [`ImmediateInfo`] / [`TickInfo`]: liveness counters and flags
//! - [`CleanupHookRegistry`]: teardown hooks run in reverse registration order
//! - [`HandleCleanupQueue`] / [`PendingCloses`]: deferred close requests
//! - [`ScopedBuffer`]: single-owner memory region backed by a [`HostAllocator`]
//!
//! Detection code never terminates the process. Fatal conditions come back as
//! [`HostError`] values; [`fatal::terminate`] is the one place that exits.

pub mod allocator;
pub mod async_context;
pub mod buffer;
pub mod cleanup;
pub mod error;
pub mod fatal;
pub mod field_buffer;
pub mod handle;
pub mod hrtime;
pub mod liveness;

pub use allocator::{AllocatorStats, HostAllocator, SystemAllocator, TrackingAllocator};
pub use async_context::{
    AsyncContext, AsyncContextStack, AsyncId, DefaultTriggerScope, BOOTSTRAP_ASYNC_ID,
    UNSET_ASYNC_ID,
};
pub use buffer::{RawRegion, ScopedBuffer};
pub use cleanup::{
    run_cleanup_hooks, CleanupFn, CleanupHookRegistry, CleanupHookToken, HasCleanupHooks,
    HookKey, ResourceId,
};
pub use error::{HostError, HostResult};
pub use fatal::FatalPolicy;
pub use field_buffer::FieldBuffer;
pub use handle::{
    HandleCleanup, HandleCleanupQueue, HandleId, NativeHandle, OnClose, PendingClose, PendingCloses,
};
pub use hrtime::HrTime;
pub use liveness::{
    ImmediateInfo, LivenessGuard, LivenessHandle, RefTransition, RequestGuard, TickInfo,
    WaitingRequests,
};
