//! fs-loader metrics harness
//!
//! Two simulated batch loaders, `eft` and `acc`, record into the same
//! Prometheus metric vectors and are told apart only by the `batch` label.
//! The registry is exposed on `/metrics` in the text exposition format.
//!
//! # Architecture
//!
//! ```text
//! WorkloadRunner ──writes──▶ MetricsRegistry ◀──reads── MetricsServer (/metrics)
//!        │                                                     │
//!        └──────────── CancellationToken (shutdown) ───────────┘
//! ```
//!
//! # Modules
//!
//! - [`config`] - Workload and server configuration
//! - [`error`] - Error types
//! - [`metrics`] - Labelled instruments and the exposition endpoint
//! - [`workload`] - Simulated workload runner

pub mod config;
pub mod error;
pub mod metrics;
pub mod workload;

// Re-export commonly used types
pub use config::{Batch, ServerConfig, WorkloadConfig};
pub use error::{Error, Result};
pub use metrics::{BatchMetrics, MetricsRegistry, MetricsServer};
pub use workload::{RunSummary, WorkloadRunner};
