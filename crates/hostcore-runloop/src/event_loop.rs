//! Event loop iterations.
//!
//! Each iteration runs three phases on the control thread:
//!
//! 1. deferred callbacks pending when the iteration started
//! 2. completions of background jobs
//! 3. close callbacks of handles whose close was requested
//!
//! followed by a drain of ticks queued outside any callback scope. The
//! loop blocks only in phase 2, and only when background completions are
//! the sole remaining work.

use hostcore_core::HostResult;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::environment::Environment;

/// How long [`Environment::run`] keeps iterating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Iterate until the host is no longer alive.
    #[default]
    Default,
    /// One iteration, waiting for a completion if that is all there is.
    Once,
    /// One iteration without blocking.
    NoWait,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Default => write!(f, "default"),
            RunMode::Once => write!(f, "once"),
            RunMode::NoWait => write!(f, "nowait"),
        }
    }
}

impl Environment {
    /// Run one loop iteration. Returns whether the host is still alive.
    pub fn run_once(&mut self, wait: bool) -> HostResult<bool> {
        self.metrics.record_iteration();

        let deferred = self.run_deferred_phase()?;
        let completed = self.run_completion_phase(wait && deferred == 0)?;
        let closed = self.run_close_phase()?;
        self.drain_ticks()?;

        trace!(deferred, completed, closed, alive = self.is_alive(), "loop iteration");
        Ok(self.is_alive())
    }

    /// Drive the loop according to `mode`. Returns whether the host is
    /// still alive afterwards.
    pub fn run(&mut self, mode: RunMode) -> HostResult<bool> {
        match mode {
            RunMode::Once => self.run_once(true),
            RunMode::NoWait => self.run_once(false),
            RunMode::Default => {
                while self.is_alive() {
                    self.run_once(true)?;
                }
                Ok(false)
            }
        }
    }

    /// Consume every available completion. With `wait`, block for one
    /// when nothing else could make progress.
    fn run_completion_phase(&mut self, wait: bool) -> HostResult<usize> {
        let mut completed = 0;
        while let Some(completion) = self.pool.try_completion() {
            self.complete_job(completion)?;
            completed += 1;
        }

        let idle = self.immediate_info.ref_count() == 0
            && !self.pending_closes.has_pending()
            && !self.tick_info.has_tick_scheduled();
        if completed == 0 && wait && idle {
            if let Some(completion) = self.pool.wait_completion() {
                self.complete_job(completion)?;
                completed += 1;
            }
            while let Some(completion) = self.pool.try_completion() {
                self.complete_job(completion)?;
                completed += 1;
            }
        }
        Ok(completed)
    }
}

#[cfg(test)]
#[path = "event_loop_tests.rs"]
mod tests;
