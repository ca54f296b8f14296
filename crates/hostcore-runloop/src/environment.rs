//! The host instance.
//!
//! One [`Environment`] exists per isolated execution unit. It owns every
//! bookkeeping primitive and is passed explicitly to each callback; there
//! is no process-wide state. All methods run on the control thread.
//!
//! The implementation is split by concern:
//! - this file: construction, async context, ticks, deferred callbacks
//! - `environment_work.rs`: background jobs
//! - `environment_resources.rs`: handles, cleanup hooks, buffers
//! - `event_loop.rs`: loop iterations
//! - `teardown.rs`: orderly shutdown

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use hostcore_config::{AllocatorKind, ConfigError, ConfigValidator, HostConfig};
use hostcore_core::{
    AsyncContext, AsyncContextStack, AsyncId, CleanupHookRegistry, DefaultTriggerScope,
    FatalPolicy, HandleCleanupQueue, HasCleanupHooks, HostAllocator, HostResult, HrTime,
    ImmediateInfo, LivenessGuard, PendingCloses, RefTransition, ResourceId, SystemAllocator,
    TickInfo, TrackingAllocator, WaitingRequests,
};
use tracing::{debug, error, info, trace, warn};

use crate::environment_work::InFlightJob;
use crate::error::RunLoopResult;
use crate::metrics::HostMetrics;
use crate::pool::WorkerPool;
use crate::work::JobId;

/// Callback run on the control thread with the host instance.
pub type HostCallback = Box<dyn FnOnce(&mut Environment) -> HostResult<()>>;

/// Identity of a scheduled deferred callback.
pub type DeferredId = u64;

struct DeferredEntry {
    id: DeferredId,
    context: AsyncContext,
    callback: HostCallback,
    guard: LivenessGuard,
}

struct TickEntry {
    context: AsyncContext,
    callback: HostCallback,
}

/// Host instance owning all per-unit bookkeeping.
pub struct Environment {
    pub(crate) config: HostConfig,
    pub(crate) fatal_policy: FatalPolicy,
    pub(crate) async_hooks: AsyncContextStack,
    pub(crate) immediate_info: ImmediateInfo,
    pub(crate) tick_info: TickInfo,
    pub(crate) waiting_requests: WaitingRequests,
    pub(crate) cleanup_hooks: CleanupHookRegistry<Environment>,
    pub(crate) handle_cleanup_queue: HandleCleanupQueue<Environment>,
    pub(crate) pending_closes: PendingCloses<Environment>,
    deferred: VecDeque<DeferredEntry>,
    ticks: VecDeque<TickEntry>,
    pub(crate) callback_scope_depth: usize,
    pub(crate) pool: WorkerPool,
    pub(crate) in_flight: HashMap<JobId, InFlightJob>,
    pub(crate) allocator: Arc<dyn HostAllocator>,
    pub(crate) tracking_allocator: Option<Arc<TrackingAllocator>>,
    pub(crate) hrtime: HrTime,
    pub(crate) metrics: Arc<HostMetrics>,
    pub(crate) next_deferred_id: DeferredId,
    pub(crate) next_job_id: JobId,
    pub(crate) next_resource_id: ResourceId,
}

impl Environment {
    /// Build a host instance. The configuration is validated first.
    pub fn new(config: HostConfig) -> RunLoopResult<Self> {
        let validation = ConfigValidator::validate(&config);
        for warning in &validation.warnings {
            warn!(path = %warning.path, "{}", warning.message);
        }
        if let Some(first) = validation.errors.first() {
            return Err(ConfigError::InvalidValue {
                field: first.path.clone(),
                message: first.message.clone(),
            }
            .into());
        }

        let tracking_allocator = match config.allocator.kind {
            AllocatorKind::System => None,
            AllocatorKind::Tracking => Some(Arc::new(TrackingAllocator::with_limit(
                config.allocator.limit_bytes,
            ))),
        };
        let allocator: Arc<dyn HostAllocator> = match &tracking_allocator {
            Some(tracking) => tracking.clone(),
            None => Arc::new(SystemAllocator),
        };
        let pool = WorkerPool::new(&config.workers)?;

        info!(
            allocator = allocator.name(),
            max_workers = config.workers.max_workers,
            check = config.async_context.check,
            "Host environment created"
        );

        Ok(Self {
            fatal_policy: FatalPolicy::new(config.fatal.abort_on_uncaught_exception),
            async_hooks: AsyncContextStack::new(
                config.async_context.initial_stack_capacity,
                config.async_context.check,
            ),
            immediate_info: ImmediateInfo::new(),
            tick_info: TickInfo::new(),
            waiting_requests: WaitingRequests::new(),
            cleanup_hooks: CleanupHookRegistry::new(),
            handle_cleanup_queue: HandleCleanupQueue::new(),
            pending_closes: PendingCloses::new(),
            deferred: VecDeque::new(),
            ticks: VecDeque::new(),
            callback_scope_depth: 0,
            pool,
            in_flight: HashMap::new(),
            allocator,
            tracking_allocator,
            hrtime: HrTime::new(),
            metrics: Arc::new(HostMetrics::new()),
            next_deferred_id: 1,
            next_job_id: 1,
            next_resource_id: 1,
            config,
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// How fatal errors from this host end the process.
    pub fn fatal_policy(&self) -> FatalPolicy {
        self.fatal_policy
    }

    pub fn async_hooks(&self) -> &AsyncContextStack {
        &self.async_hooks
    }

    pub fn immediate_info(&self) -> &ImmediateInfo {
        &self.immediate_info
    }

    pub fn tick_info(&self) -> &TickInfo {
        &self.tick_info
    }

    pub fn waiting_requests(&self) -> u64 {
        self.waiting_requests.count()
    }

    /// Closes requested and not yet completed.
    pub fn handle_cleanup_waiting(&self) -> u64 {
        self.pending_closes.waiting()
    }

    pub fn hrtime(&self) -> &HrTime {
        &self.hrtime
    }

    pub fn metrics(&self) -> Arc<HostMetrics> {
        self.metrics.clone()
    }

    pub fn allocator(&self) -> Arc<dyn HostAllocator> {
        self.allocator.clone()
    }

    /// The tracking allocator, when configured.
    pub fn tracking_allocator(&self) -> Option<&Arc<TrackingAllocator>> {
        self.tracking_allocator.as_ref()
    }

    /// Nesting depth of [`run_in_context`](Self::run_in_context) scopes.
    pub fn callback_scope_depth(&self) -> usize {
        self.callback_scope_depth
    }

    /// Whether the loop still has a reason to iterate.
    pub fn is_alive(&self) -> bool {
        self.immediate_info.ref_count() > 0
            || self.waiting_requests.count() > 0
            || self.pending_closes.waiting() > 0
            || self.tick_info.has_tick_scheduled()
    }

    pub fn next_resource_id(&mut self) -> ResourceId {
        let id = self.next_resource_id;
        self.next_resource_id += 1;
        id
    }

    /// Make `(async_id, trigger_async_id)` the current context.
    pub fn enter_context(&self, async_id: AsyncId, trigger_async_id: AsyncId) -> HostResult<()> {
        self.async_hooks.push(async_id, trigger_async_id)?;
        self.metrics.record_stack_depth(self.async_hooks.depth());
        Ok(())
    }

    /// Leave the context entered with `expected_async_id`.
    pub fn exit_context(&self, expected_async_id: AsyncId) -> HostResult<bool> {
        let result = self.async_hooks.pop(expected_async_id);
        if let Err(e) = &result {
            error!(error = %e, saved = ?self.async_hooks.saved_contexts(), "async context mismatch");
        }
        result
    }

    /// Allocate a context for new work caused by the current one.
    pub fn new_async_context(&self) -> AsyncContext {
        AsyncContext::new(
            self.async_hooks.new_async_id(),
            self.async_hooks.default_trigger_async_id(),
        )
    }

    /// Run `f` inside a callback scope for `(async_id, trigger_async_id)`.
    ///
    /// When the outermost scope closes, queued ticks are drained.
    pub fn run_in_context<R>(
        &mut self,
        async_id: AsyncId,
        trigger_async_id: AsyncId,
        f: impl FnOnce(&mut Self) -> HostResult<R>,
    ) -> HostResult<R> {
        self.callback_scope_depth += 1;
        let result = self.invoke(AsyncContext::new(async_id, trigger_async_id), f);
        self.callback_scope_depth -= 1;
        let value = result?;

        if self.callback_scope_depth == 0 {
            self.drain_ticks()?;
        }
        Ok(value)
    }

    /// Run `f` with `trigger_async_id` as the default trigger for any work
    /// it creates.
    pub fn with_default_trigger<R>(
        &mut self,
        trigger_async_id: AsyncId,
        f: impl FnOnce(&mut Self) -> R,
    ) -> HostResult<R> {
        let _scope = DefaultTriggerScope::new(&self.async_hooks, trigger_async_id)?;
        Ok(f(self))
    }

    fn invoke<R>(
        &mut self,
        context: AsyncContext,
        f: impl FnOnce(&mut Self) -> HostResult<R>,
    ) -> HostResult<R> {
        self.enter_context(context.async_id, context.trigger_async_id)?;
        let result = f(self);
        let popped = self.exit_context(context.async_id);
        let value = result?;
        popped?;
        Ok(value)
    }

    /// Queue a callback for the end of the current callback scope.
    pub fn queue_tick(&mut self, callback: impl FnOnce(&mut Self) -> HostResult<()> + 'static) {
        let context = self.new_async_context();
        self.ticks.push_back(TickEntry {
            context,
            callback: Box::new(callback),
        });
        self.tick_info.set_has_tick_scheduled(true);
        trace!(async_id = context.async_id, "tick queued");
    }

    /// Run queued ticks in FIFO order, including ticks they queue.
    ///
    /// Ticks run inside a scope of their own, so callback scopes opened by
    /// a tick do not start a nested drain.
    pub(crate) fn drain_ticks(&mut self) -> HostResult<()> {
        if !self.tick_info.has_tick_scheduled() && !self.tick_info.has_rejection_to_warn() {
            return Ok(());
        }

        self.callback_scope_depth += 1;
        let drained = self.run_tick_queue();
        self.callback_scope_depth -= 1;
        drained?;
        self.tick_info.set_has_tick_scheduled(false);

        if self.tick_info.has_rejection_to_warn() {
            warn!("unhandled rejection left after draining ticks");
            self.tick_info.set_has_rejection_to_warn(false);
        }
        Ok(())
    }

    fn run_tick_queue(&mut self) -> HostResult<()> {
        while let Some(tick) = self.ticks.pop_front() {
            self.invoke(tick.context, tick.callback)?;
            self.metrics.record_tick_run();
        }
        Ok(())
    }

    /// Schedule `callback` for the deferred phase of a later loop iteration.
    /// With `keep_alive`, the pending callback keeps the loop running.
    pub fn schedule_deferred(
        &mut self,
        callback: impl FnOnce(&mut Self) -> HostResult<()> + 'static,
        keep_alive: bool,
    ) -> DeferredId {
        let id = self.next_deferred_id;
        self.next_deferred_id += 1;
        let context = self.new_async_context();
        let guard = self.immediate_info.hold(keep_alive);
        self.deferred.push_back(DeferredEntry {
            id,
            context,
            callback: Box::new(callback),
            guard,
        });
        debug!(deferred = id, keep_alive, "deferred callback scheduled");
        id
    }

    /// Drop a deferred callback before it runs. Returns whether it was
    /// still pending.
    pub fn cancel_deferred(&mut self, id: DeferredId) -> bool {
        let Some(pos) = self.deferred.iter().position(|e| e.id == id) else {
            return false;
        };
        self.deferred.remove(pos);
        debug!(deferred = id, "deferred callback cancelled");
        true
    }

    /// Switch a pending deferred callback between referenced and
    /// unreferenced. Returns `None` when it is no longer pending.
    pub fn set_deferred_keep_alive(
        &mut self,
        id: DeferredId,
        keep_alive: bool,
    ) -> HostResult<Option<RefTransition>> {
        match self.deferred.iter_mut().find(|e| e.id == id) {
            Some(entry) => entry.guard.set_keep_alive(keep_alive).map(Some),
            None => Ok(None),
        }
    }

    pub fn deferred_pending(&self) -> usize {
        self.deferred.len()
    }

    /// Run the callbacks that were pending when the phase started.
    pub(crate) fn run_deferred_phase(&mut self) -> HostResult<usize> {
        let batch = self.deferred.len();
        if batch == 0 {
            return Ok(0);
        }
        self.immediate_info.set_has_outstanding(true);

        let mut ran = 0;
        for _ in 0..batch {
            let Some(entry) = self.deferred.pop_front() else {
                break;
            };
            let DeferredEntry {
                context,
                callback,
                guard,
                ..
            } = entry;
            let result = self.run_in_context(context.async_id, context.trigger_async_id, callback);
            drop(guard);
            self.metrics.record_deferred_run();
            ran += 1;
            if let Err(e) = result {
                self.immediate_info.set_has_outstanding(false);
                return Err(e);
            }
        }

        self.immediate_info.set_has_outstanding(!self.deferred.is_empty());
        Ok(ran)
    }
}

impl HasCleanupHooks for Environment {
    fn cleanup_hooks(&mut self) -> &mut CleanupHookRegistry<Self> {
        &mut self.cleanup_hooks
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if !self.in_flight.is_empty() || !self.cleanup_hooks.is_empty() {
            warn!(
                in_flight = self.in_flight.len(),
                cleanup_hooks = self.cleanup_hooks.len(),
                "environment dropped without teardown"
            );
        }
        // Completions that never ran still hold their waiting requests.
        self.in_flight.clear();
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("depth", &self.async_hooks.depth())
            .field("deferred", &self.deferred.len())
            .field("ticks", &self.ticks.len())
            .field("in_flight", &self.in_flight.len())
            .field("pending_closes", &self.pending_closes.waiting())
            .field("cleanup_hooks", &self.cleanup_hooks.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
