//! Metrics module
//!
//! Labelled batch metrics and the HTTP endpoint that exposes them.

mod registry;
mod server;

pub use registry::{
    BatchMetrics, MetricsRegistry, API_DURATION, BATCH_LABEL, DURATION_BUCKETS, METRIC_NAMES,
    OPERATIONS_COUNT, OPERATIONS_DURATION, SQL_DURATION, TXN_COUNT,
};
pub use server::MetricsServer;
