//! `simulate` command: a synthetic workload over one host instance.

use std::cell::Cell;
use std::rc::Rc;

use hostcore_config::HostConfig;
use hostcore_core::{HostResult, HrTime};
use hostcore_runloop::{Environment, MetricsSnapshot, RunLoopResult, RunMode, WorkStatus};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::SimulateArgs;

/// What the simulation did, printed as JSON.
#[derive(Debug, Serialize)]
pub(crate) struct SimulationReport {
    pub hooks_run: usize,
    pub jobs_cancelled_on_request: usize,
    pub deepest_scope: usize,
    pub hrtime: [u32; 3],
    pub hrtime_ns: u64,
    pub allocator: Option<AllocatorReport>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct AllocatorReport {
    pub live_allocations: usize,
    pub live_bytes: usize,
    pub total_allocations: u64,
    pub total_frees: u64,
    pub failed_allocations: u64,
}

/// Run the workload described by `args` and tear the host down.
pub(crate) fn handle_simulate(config: HostConfig, args: &SimulateArgs) -> RunLoopResult<SimulationReport> {
    info!(?args, "Starting simulation");
    let mut env = Environment::new(config)?;
    let deepest = Rc::new(Cell::new(0));

    let root = env.new_async_context();
    let d = deepest.clone();
    let depth = args.depth;
    env.run_in_context(root.async_id, root.trigger_async_id, move |env| {
        nest(env, depth.saturating_sub(1), &d)
    })?;

    let mut cancelled = 0;
    for i in 0..args.jobs {
        let size = 1_024 * (i + 1);
        let handle = env.submit_background_job(
            format!("checksum-{}", i),
            move |cancel| {
                let mut sum: u64 = 0;
                for b in 0..size {
                    if b % 256 == 0 && cancel.is_cancelled() {
                        break;
                    }
                    sum = sum.wrapping_mul(31).wrapping_add(b as u64);
                }
                sum
            },
            move |env, status, sum| record_job(env, i, status, sum),
        )?;
        if args.cancel_every.is_some_and(|k| k > 0 && i % k == 0)
            && env.cancel_background_job(&handle)
        {
            cancelled += 1;
        }
    }

    for i in 0..args.deferred {
        env.schedule_deferred(
            move |env| {
                let mut buffer = env.allocate_buffer(256)?;
                buffer.as_mut_slice().fill(i as u8);
                if let Some(region) = buffer.release() {
                    debug!(deferred = i, len = region.len(), "buffer handed off");
                    region.free();
                }
                Ok(())
            },
            i % 2 == 0,
        );
    }

    for i in 0..args.hooks {
        let resource = env.next_resource_id();
        env.add_cleanup_hook("close-resource", resource, move |env| {
            let handle = env.new_handle("resource").with_data(i);
            env.close_handle(handle, |_, handle| {
                debug!(handle = handle.id(), index = ?handle.data::<usize>(), "resource closed");
            });
        })?;
        let handle = env.new_handle("socket");
        env.register_handle_cleanup(handle, |env, handle| {
            env.close_handle(handle, |_, _| {});
        });
    }

    env.run(RunMode::Default)?;
    let hooks_run = env.run_cleanup()?;

    let allocator = env.tracking_allocator().map(|tracking| {
        let stats = tracking.stats();
        AllocatorReport {
            live_allocations: stats.live_allocations,
            live_bytes: stats.live_bytes,
            total_allocations: stats.total_allocations,
            total_frees: stats.total_frees,
            failed_allocations: stats.failed_allocations,
        }
    });
    let clock: &HrTime = env.hrtime();

    Ok(SimulationReport {
        hooks_run,
        jobs_cancelled_on_request: cancelled,
        deepest_scope: deepest.get(),
        hrtime: clock.hrtime(),
        hrtime_ns: clock.hrtime_bigint(),
        allocator,
        metrics: env.metrics().snapshot(),
    })
}

/// Open `remaining` more nested scopes, queueing a tick at each level.
fn nest(env: &mut Environment, remaining: usize, deepest: &Rc<Cell<usize>>) -> HostResult<()> {
    deepest.set(deepest.get().max(env.callback_scope_depth()));
    let level = env.callback_scope_depth();
    env.queue_tick(move |env| {
        debug!(level, async_id = env.async_hooks().execution_async_id(), "tick");
        Ok(())
    });
    if remaining == 0 {
        return Ok(());
    }
    let child = env.new_async_context();
    env.run_in_context(child.async_id, child.trigger_async_id, |env| {
        nest(env, remaining - 1, deepest)
    })
}

fn record_job(env: &mut Environment, index: usize, status: WorkStatus, sum: Option<u64>) -> HostResult<()> {
    debug!(
        job = index,
        %status,
        sum = ?sum,
        waiting = env.waiting_requests(),
        "job finished"
    );
    Ok(())
}
