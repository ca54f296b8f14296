//! Error types for the host core.

use thiserror::Error;

/// Errors raised by the bookkeeping primitives.
///
/// Most variants are contract violations and are fatal: the surrounding
/// system must turn them into process termination (see [`crate::fatal`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// Pop with an id that does not match the current execution context.
    #[error("async hook stack has become corrupted (actual: {actual}, expected: {expected})")]
    AsyncStackCorrupted { actual: f64, expected: f64 },

    /// An id below the allowed minimum while checking is enabled.
    #[error("invalid {field}: {value} (must be >= {min})")]
    InvalidAsyncId {
        field: &'static str,
        value: f64,
        min: f64,
    },

    /// The same `(name, resource)` pair was registered twice.
    #[error("cleanup hook '{name}' already registered for resource {resource}")]
    DuplicateCleanupHook { name: &'static str, resource: u64 },

    /// A counter was decremented below zero.
    #[error("{counter} underflow: cannot subtract {by} from {current}")]
    CounterUnderflow {
        counter: &'static str,
        current: u64,
        by: u64,
    },

    /// Checked allocation failed.
    #[error("allocation of {size} bytes failed")]
    AllocationFailed { size: usize },

    /// Reallocation of a live buffer failed.
    #[error("reallocation to {size} bytes failed")]
    ReallocationFailed { size: usize },

    /// The background pool refused a job.
    #[error("background pool rejected job '{job}': {reason}")]
    SubmissionRejected { job: String, reason: String },

    /// Teardown gave up waiting for outstanding work.
    #[error("teardown stalled with {waiting_requests} waiting requests and {waiting_closes} pending closes")]
    TeardownStalled {
        waiting_requests: u64,
        waiting_closes: u64,
    },
}

impl HostError {
    /// Whether this error must end the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            HostError::AsyncStackCorrupted { .. }
            | HostError::InvalidAsyncId { .. }
            | HostError::DuplicateCleanupHook { .. }
            | HostError::CounterUnderflow { .. }
            | HostError::AllocationFailed { .. }
            | HostError::ReallocationFailed { .. } => true,
            HostError::SubmissionRejected { .. } | HostError::TeardownStalled { .. } => false,
        }
    }
}

/// Result type for host core operations.
pub type HostResult<T> = Result<T, HostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_message_matches_ids() {
        let err = HostError::AsyncStackCorrupted {
            actual: 7.0,
            expected: 999.0,
        };
        let display = err.to_string();
        assert!(display.contains("actual: 7"));
        assert!(display.contains("expected: 999"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_resource_errors_are_not_fatal() {
        let err = HostError::SubmissionRejected {
            job: "hash".to_string(),
            reason: "pool is shut down".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("hash"));
    }

    #[test]
    fn test_duplicate_hook_message() {
        let err = HostError::DuplicateCleanupHook {
            name: "close-timer",
            resource: 42,
        };
        assert!(err.to_string().contains("close-timer"));
        assert!(err.to_string().contains("42"));
    }
}
