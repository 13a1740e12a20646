//! Configuration for the simulated workloads and the exposition endpoint.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Default address the `/metrics` endpoint binds to.
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9000";

/// Default number of loop iterations per run.
pub const DEFAULT_ITERATIONS: u32 = 200;

/// Default upper bound for the simulated "large SQL query" sleep.
pub const DEFAULT_QUERY_MAX: Duration = Duration::from_millis(10_000);

/// Default upper bound for each simulated per-iteration sub-task sleep.
pub const DEFAULT_TASK_MAX: Duration = Duration::from_millis(5_000);

// =============================================================================
// Batch
// =============================================================================

/// A named simulated workload.
///
/// `target_count` is what the `txn_count` gauge is set to before the loop
/// starts (the record count a real query would have returned).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    pub name: String,
    /// Value of the `batch` label on every instrument. Older fs_loader
    /// dashboards keyed the counter and histograms on `nrt_eft`/`nrt_acc`;
    /// those series are now `eft`/`acc` like the gauge.
    pub label: String,
    pub target_count: f64,
}

impl Batch {
    pub fn new(name: impl Into<String>, label: impl Into<String>, target_count: f64) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            target_count,
        }
    }

    /// The EFT batch.
    pub fn eft() -> Self {
        Self::new("EFT", "eft", 9_752_395.0)
    }

    /// The ACC batch.
    pub fn acc() -> Self {
        Self::new("ACC", "acc", 104_565.0)
    }
}

// =============================================================================
// Workload Configuration
// =============================================================================

/// Configuration for the workload runner
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// Batches processed, in order, on every step
    pub batches: Vec<Batch>,

    /// Number of loop iterations
    pub iterations: u32,

    /// Exclusive upper bound of the simulated query sleep
    pub query_max: Duration,

    /// Exclusive upper bound of each simulated sub-task sleep
    pub task_max: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            batches: vec![Batch::eft(), Batch::acc()],
            iterations: DEFAULT_ITERATIONS,
            query_max: DEFAULT_QUERY_MAX,
            task_max: DEFAULT_TASK_MAX,
        }
    }
}

impl WorkloadConfig {
    /// Rejects configurations the runner cannot make sense of.
    pub fn validate(&self) -> Result<()> {
        if self.batches.is_empty() {
            return Err(Error::Config("at least one batch is required".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the exposition endpoint
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the metrics HTTP server to
    pub listen_addr: SocketAddr,

    /// Keep serving after the workload finishes, until a signal arrives
    pub keep_serving: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            keep_serving: false,
        }
    }
}

/// Parses a `host:port` listen address.
pub fn parse_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse().map_err(|e: std::net::AddrParseError| Error::InvalidAddress {
        addr: addr.to_string(),
        reason: e.to_string(),
    })
}
