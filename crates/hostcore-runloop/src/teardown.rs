//! Orderly shutdown of a host instance.
//!
//! Teardown first cleans up handles: queued handle finalizers run, in-flight
//! background jobs are asked to cancel, and the loop is driven until no
//! request or close is outstanding. Cleanup hooks then run newest first,
//! with handle cleanup after every pass, until no hook is left. The worker
//! pool is stopped last.

use hostcore_core::{run_cleanup_hooks, HostError, HostResult};
use tracing::{debug, info};

use crate::environment::Environment;

impl Environment {
    /// Run queued handle finalizers and drive the loop until every
    /// outstanding request and close has completed.
    ///
    /// Gives up with `TeardownStalled` after `max_drain_iterations` loop
    /// iterations.
    pub fn cleanup_handles(&mut self) -> HostResult<()> {
        let cancelled = self.cancel_all_jobs();
        let queued = self.handle_cleanup_queue.take_all();
        debug!(
            cancelled,
            handles = queued.len(),
            waiting_requests = self.waiting_requests(),
            "cleaning up handles"
        );
        for entry in queued {
            (entry.finalizer)(self, entry.handle);
        }

        let limit = self.config.teardown.max_drain_iterations;
        let mut iterations = 0;
        while self.handle_cleanup_waiting() > 0 || self.waiting_requests() > 0 {
            if iterations >= limit {
                return Err(HostError::TeardownStalled {
                    waiting_requests: self.waiting_requests(),
                    waiting_closes: self.handle_cleanup_waiting(),
                });
            }
            self.run_once(true)?;
            iterations += 1;
        }
        Ok(())
    }

    /// Tear the host down. Returns the number of cleanup hooks invoked.
    pub fn run_cleanup(&mut self) -> HostResult<usize> {
        info!(
            hooks = self.cleanup_hooks.len(),
            in_flight = self.in_flight.len(),
            "Running host cleanup"
        );

        self.cleanup_handles()?;
        let invoked = run_cleanup_hooks(self, Environment::cleanup_handles)?;
        self.metrics.record_hooks_run(invoked as u64);

        self.pool.shutdown();
        info!(hooks_run = invoked, "Host cleanup complete");
        Ok(invoked)
    }
}

#[cfg(test)]
#[path = "teardown_tests.rs"]
mod tests;
