//! Turning fatal host errors into process termination.
//!
//! Detection code only returns [`HostError`]. The surrounding system calls
//! [`report`] to write the diagnostic and [`terminate`] to exit; nothing else
//! in the workspace ends the process.

use std::backtrace::Backtrace;

use tracing::error;

use crate::error::HostError;

/// How a fatal error ends the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FatalPolicy {
    /// Abort (core dump) instead of exiting with status 1.
    pub abort_on_uncaught_exception: bool,
}

impl FatalPolicy {
    pub fn new(abort_on_uncaught_exception: bool) -> Self {
        Self {
            abort_on_uncaught_exception,
        }
    }
}

/// Render the diagnostic report for `err`, including a backtrace.
pub fn render(err: &HostError) -> String {
    let backtrace = Backtrace::force_capture();
    match err {
        HostError::AsyncStackCorrupted { .. } => format!(
            "Error: {err}\n----- Native stack trace -----\n{backtrace}\n\
             ----- Recovery -----\nThe async context stack no longer matches the callbacks \
             running on it. Causal tracking is unreliable from this point on."
        ),
        _ => format!("FATAL ERROR: {err}\n----- Native stack trace -----\n{backtrace}"),
    }
}

/// Write the diagnostic report for `err` to the log and to stderr.
pub fn report(err: &HostError) {
    error!(error = %err, fatal = err.is_fatal(), "fatal host error");
    eprintln!("{}", render(err));
}

/// Report `err` and end the process according to `policy`.
pub fn terminate(err: &HostError, policy: FatalPolicy) -> ! {
    report(err);
    if policy.abort_on_uncaught_exception {
        std::process::abort();
    }
    std::process::exit(1);
}
