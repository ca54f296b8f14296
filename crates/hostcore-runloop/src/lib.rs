//! # HostCore RunLoop
//!
//! The host instance and the loop that drives it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── control thread ────────────────────────────┐
//! │  Environment                                                            │
//! │   ├── AsyncContextStack     run_in_context / enter / exit               │
//! │   ├── ImmediateInfo         deferred callbacks, keep-alive refs         │
//! │   ├── TickInfo              tick queue drained at scope exit            │
//! │   ├── CleanupHookRegistry   teardown finalizers                         │
//! │   ├── HandleCleanupQueue    batched handle closes                       │
//! │   └── in-flight jobs ───────┐ submit            ▲ completion            │
//! └─────────────────────────────┼───────────────────┼───────────────────────┘
//!                               ▼                   │
//!                    ┌──────── WorkerPool (tokio) ──┴──┐
//!                    │ semaphore-bounded bodies        │
//!                    └─────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Environment`]: the host instance
//! - [`ThreadPoolWork`] / [`FnWork`]: background work items
//! - [`WorkerPool`]: bounded pool running work bodies
//! - [`RunMode`]: how long [`Environment::run`] iterates
//! - [`HostMetrics`]: counters with a serializable snapshot

pub mod environment;
mod environment_resources;
mod environment_work;
pub mod error;
pub mod event_loop;
pub mod metrics;
pub mod pool;
mod teardown;
pub mod work;

pub use environment::{DeferredId, Environment, HostCallback};
pub use error::{RunLoopError, RunLoopResult};
pub use event_loop::RunMode;
pub use metrics::{HostMetrics, MetricsSnapshot};
pub use pool::{Completion, WorkerPool};
pub use work::{FnWork, JobId, ThreadPoolWork, WorkHandle, WorkState, WorkStatus};

pub use tokio_util::sync::CancellationToken;
