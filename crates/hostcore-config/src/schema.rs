//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration for one host instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub async_context: AsyncContextConfig,

    #[serde(default)]
    pub fatal: FatalConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub allocator: AllocatorConfig,

    #[serde(default)]
    pub teardown: TeardownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Async context stack configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncContextConfig {
    /// Verify ids on push/pop and in default trigger scopes.
    #[serde(default = "default_true")]
    pub check: bool,

    /// Number of context entries the stack holds before it first grows.
    #[serde(default = "default_initial_stack_capacity")]
    pub initial_stack_capacity: usize,
}

impl Default for AsyncContextConfig {
    fn default() -> Self {
        Self {
            check: true,
            initial_stack_capacity: default_initial_stack_capacity(),
        }
    }
}

/// How fatal conditions end the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FatalConfig {
    /// Abort (core dump) instead of exiting with status 1.
    #[serde(default)]
    pub abort_on_uncaught_exception: bool,
}

/// Background worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of jobs running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Capacity hint for the completion queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Which allocator backs scoped buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    #[default]
    System,
    Tracking,
}

/// Allocator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default)]
    pub kind: AllocatorKind,

    /// Upper bound on live bytes (tracking allocator only).
    #[serde(default)]
    pub limit_bytes: Option<usize>,
}

/// Teardown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownConfig {
    /// Loop iterations allowed while waiting for outstanding closes.
    #[serde(default = "default_max_drain_iterations")]
    pub max_drain_iterations: usize,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            max_drain_iterations: default_max_drain_iterations(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files (console only when unset).
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_initial_stack_capacity() -> usize {
    16
}

fn default_max_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_max_drain_iterations() -> usize {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HostConfig::default();
        assert!(config.async_context.check);
        assert_eq!(config.async_context.initial_stack_capacity, 16);
        assert!(!config.fatal.abort_on_uncaught_exception);
        assert_eq!(config.workers.max_workers, 4);
        assert_eq!(config.allocator.kind, AllocatorKind::System);
        assert_eq!(config.teardown.max_drain_iterations, 10_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = HostConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: HostConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.workers.max_workers, config.workers.max_workers);
        assert_eq!(parsed.allocator.kind, config.allocator.kind);
    }

    #[test]
    fn test_allocator_kind_lowercase() {
        let parsed: AllocatorConfig = toml::from_str("kind = \"tracking\"").unwrap();
        assert_eq!(parsed.kind, AllocatorKind::Tracking);
        assert!(parsed.limit_bytes.is_none());
    }
}
