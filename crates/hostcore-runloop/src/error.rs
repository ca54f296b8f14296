//! Error types for the host run loop.

use hostcore_config::ConfigError;
use hostcore_core::HostError;
use thiserror::Error;

/// Errors raised while building or driving a host instance.
#[derive(Debug, Error)]
pub enum RunLoopError {
    /// A bookkeeping primitive failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The worker pool runtime could not be started.
    #[error("Worker pool error: {0}")]
    Pool(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RunLoopError {
    /// The host error to hand to [`hostcore_core::fatal::terminate`], if
    /// this error must end the process.
    pub fn as_fatal(&self) -> Option<&HostError> {
        match self {
            RunLoopError::Host(e) if e.is_fatal() => Some(e),
            _ => None,
        }
    }
}

/// Result type for run loop operations.
pub type RunLoopResult<T> = Result<T, RunLoopError>;
