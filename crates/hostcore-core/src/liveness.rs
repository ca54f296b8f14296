//! Liveness counters.
//!
//! These counters decide whether the event loop still has a reason to
//! iterate. [`ImmediateInfo`] counts deferred callbacks and how many of
//! them keep the loop referenced, [`TickInfo`] carries the tick flags, and
//! [`WaitingRequests`] counts background jobs in flight.
//!
//! Increments are paired with guards ([`LivenessGuard`], [`RequestGuard`])
//! whose drop performs the matching decrement, so every exit path of the
//! owner releases what it took.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{HostError, HostResult};
use crate::field_buffer::FieldBuffer;

/// Slot layout of [`ImmediateInfo::fields`].
pub mod immediate_fields {
    pub const COUNT: usize = 0;
    pub const REF_COUNT: usize = 1;
    pub const HAS_OUTSTANDING: usize = 2;
    pub const FIELDS_COUNT: usize = 3;
}

/// Slot layout of [`TickInfo::fields`].
pub mod tick_fields {
    pub const HAS_TICK_SCHEDULED: usize = 0;
    pub const HAS_REJECTION_TO_WARN: usize = 1;
    pub const FIELDS_COUNT: usize = 2;
}

/// Result of a ref-count adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTransition {
    /// `ref_count` went from 0 to positive.
    Activated,
    /// `ref_count` returned to 0.
    Deactivated,
    Unchanged,
}

/// Active/inactive flag of the loop handle owned by the host.
#[derive(Debug, Clone, Default)]
pub struct LivenessHandle {
    active: Arc<AtomicBool>,
    transitions: Arc<AtomicU64>,
}

impl LivenessHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of active/inactive flips so far.
    pub fn transitions(&self) -> u64 {
        self.transitions.load(Ordering::SeqCst)
    }

    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            self.transitions.fetch_add(1, Ordering::SeqCst);
            debug!(active, "liveness handle toggled");
        }
    }
}

/// Counters for deferred ("immediate") callbacks.
#[derive(Debug, Clone)]
pub struct ImmediateInfo {
    fields: FieldBuffer<u32>,
    handle: LivenessHandle,
}

impl Default for ImmediateInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmediateInfo {
    pub fn new() -> Self {
        Self {
            fields: FieldBuffer::new(immediate_fields::FIELDS_COUNT),
            handle: LivenessHandle::new(),
        }
    }

    /// Shared `[COUNT, REF_COUNT, HAS_OUTSTANDING]` fields.
    pub fn fields(&self) -> &FieldBuffer<u32> {
        &self.fields
    }

    /// The loop handle toggled by `ref_count` transitions.
    pub fn handle(&self) -> &LivenessHandle {
        &self.handle
    }

    pub fn count(&self) -> u32 {
        self.fields.get(immediate_fields::COUNT)
    }

    pub fn ref_count(&self) -> u32 {
        self.fields.get(immediate_fields::REF_COUNT)
    }

    pub fn has_outstanding(&self) -> bool {
        self.fields.get(immediate_fields::HAS_OUTSTANDING) == 1
    }

    pub fn set_has_outstanding(&self, value: bool) {
        self.fields
            .set(immediate_fields::HAS_OUTSTANDING, u32::from(value));
    }

    pub fn count_inc(&self, increment: u32) {
        self.fields
            .update(immediate_fields::COUNT, |v| v.saturating_add(increment));
    }

    pub fn count_dec(&self, decrement: u32) -> HostResult<()> {
        checked_dec(&self.fields, immediate_fields::COUNT, "immediate count", decrement)
            .map(|_| ())
    }

    pub fn ref_count_inc(&self, increment: u32) -> RefTransition {
        let mut previous = 0;
        let current = self.fields.update(immediate_fields::REF_COUNT, |v| {
            previous = v;
            v.saturating_add(increment)
        });
        if previous == 0 && current > 0 {
            self.handle.set_active(true);
            RefTransition::Activated
        } else {
            RefTransition::Unchanged
        }
    }

    pub fn ref_count_dec(&self, decrement: u32) -> HostResult<RefTransition> {
        let (previous, current) = checked_dec(
            &self.fields,
            immediate_fields::REF_COUNT,
            "immediate ref_count",
            decrement,
        )?;
        if previous > 0 && current == 0 {
            self.handle.set_active(false);
            Ok(RefTransition::Deactivated)
        } else {
            Ok(RefTransition::Unchanged)
        }
    }

    /// Count one deferred callback, referenced when `keep_alive` is set.
    /// The returned guard undoes both adjustments when dropped.
    pub fn hold(&self, keep_alive: bool) -> LivenessGuard {
        self.count_inc(1);
        if keep_alive {
            self.ref_count_inc(1);
        }
        LivenessGuard {
            info: self.clone(),
            keep_alive,
        }
    }
}

/// Holds one unit of [`ImmediateInfo::count`], plus one unit of
/// `ref_count` while it keeps the loop alive.
#[must_use = "dropping the guard releases the count immediately"]
#[derive(Debug)]
pub struct LivenessGuard {
    info: ImmediateInfo,
    keep_alive: bool,
}

impl LivenessGuard {
    pub fn keeps_alive(&self) -> bool {
        self.keep_alive
    }

    /// Switch between referenced and unreferenced.
    pub fn set_keep_alive(&mut self, keep_alive: bool) -> HostResult<RefTransition> {
        if keep_alive == self.keep_alive {
            return Ok(RefTransition::Unchanged);
        }
        let transition = if keep_alive {
            self.info.ref_count_inc(1)
        } else {
            self.info.ref_count_dec(1)?
        };
        self.keep_alive = keep_alive;
        Ok(transition)
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        let released = self.info.count_dec(1).and_then(|()| {
            if self.keep_alive {
                self.info.ref_count_dec(1).map(|_| ())
            } else {
                Ok(())
            }
        });
        if let Err(e) = released {
            error!(error = %e, "liveness guard released an unbalanced counter");
        }
    }
}

/// Flags for tick-style callbacks.
#[derive(Debug, Clone)]
pub struct TickInfo {
    fields: FieldBuffer<u8>,
}

impl Default for TickInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl TickInfo {
    pub fn new() -> Self {
        Self {
            fields: FieldBuffer::new(tick_fields::FIELDS_COUNT),
        }
    }

    pub fn fields(&self) -> &FieldBuffer<u8> {
        &self.fields
    }

    pub fn has_tick_scheduled(&self) -> bool {
        self.fields.get(tick_fields::HAS_TICK_SCHEDULED) == 1
    }

    pub fn set_has_tick_scheduled(&self, value: bool) {
        self.fields
            .set(tick_fields::HAS_TICK_SCHEDULED, u8::from(value));
    }

    pub fn has_rejection_to_warn(&self) -> bool {
        self.fields.get(tick_fields::HAS_REJECTION_TO_WARN) == 1
    }

    pub fn set_has_rejection_to_warn(&self, value: bool) {
        self.fields
            .set(tick_fields::HAS_REJECTION_TO_WARN, u8::from(value));
    }
}

/// Number of background requests that have been submitted and whose
/// completion has not been consumed yet.
#[derive(Debug, Clone, Default)]
pub struct WaitingRequests {
    count: Arc<AtomicU64>,
}

impl WaitingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Take one unit; the guard gives it back when dropped.
    pub fn acquire(&self) -> RequestGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            count: Some(self.count.clone()),
        }
    }
}

/// One unit of [`WaitingRequests`].
#[must_use = "dropping the guard releases the request immediately"]
#[derive(Debug)]
pub struct RequestGuard {
    count: Option<Arc<AtomicU64>>,
}

impl RequestGuard {
    /// Give the unit back now. Later calls and the drop do nothing.
    pub fn release(&mut self) -> HostResult<()> {
        let Some(count) = self.count.take() else {
            return Ok(());
        };
        count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .map(|_| ())
            .map_err(|current| HostError::CounterUnderflow {
                counter: "waiting requests",
                current,
                by: 1,
            })
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!(error = %e, "request guard released an unbalanced counter");
        }
    }
}

fn checked_dec(
    fields: &FieldBuffer<u32>,
    index: usize,
    counter: &'static str,
    decrement: u32,
) -> HostResult<(u32, u32)> {
    let previous = fields.get(index);
    let current = previous
        .checked_sub(decrement)
        .ok_or(HostError::CounterUnderflow {
            counter,
            current: u64::from(previous),
            by: u64::from(decrement),
        })?;
    fields.set(index, current);
    Ok((previous, current))
}

#[cfg(test)]
#[path = "liveness_tests.rs"]
mod tests;
