//! Labelled batch metrics and the registry that owns them.
//!
//! Both simulated workloads write into the same five metric vectors. The
//! only thing separating their series is the value of the `batch` label.

use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::Result;

/// Label key shared by every instrument.
pub const BATCH_LABEL: &str = "batch";

/// Bucket boundaries (seconds) shared by the three duration histograms.
pub const DURATION_BUCKETS: [f64; 5] = [0.1, 0.15, 0.2, 0.25, 0.3];

pub const TXN_COUNT: &str = "txn_count";
pub const OPERATIONS_COUNT: &str = "lb_fs_etl_operations_count";
pub const SQL_DURATION: &str = "lb_fs_sql_duration_seconds";
pub const OPERATIONS_DURATION: &str = "lb_fs_etl_operations_seconds";
pub const API_DURATION: &str = "lb_fs_api_duration_seconds";

/// Names of every instrument registered by [`BatchMetrics::register`].
pub const METRIC_NAMES: [&str; 5] = [
    TXN_COUNT,
    OPERATIONS_COUNT,
    SQL_DURATION,
    OPERATIONS_DURATION,
    API_DURATION,
];

/// The five instruments, each vectorized over [`BATCH_LABEL`].
#[derive(Clone, Debug)]
pub struct BatchMetrics {
    /// Target amount of records per batch.
    pub info: GaugeVec,
    /// Completed sub-task requests per batch.
    pub req_processed: IntCounterVec,
    /// Simulated SQL query latency.
    pub sql_duration: HistogramVec,
    /// Latency of a whole loop iteration.
    pub rec_duration: HistogramVec,
    /// Latency of a single simulated sub-task.
    pub api_duration: HistogramVec,
}

impl BatchMetrics {
    /// Creates the instruments and registers them into `registry`.
    ///
    /// Registering twice into the same registry fails with
    /// `prometheus::Error::AlreadyReg`.
    pub fn register(registry: &Registry) -> Result<Self> {
        let labels = &[BATCH_LABEL];

        let info = GaugeVec::new(
            Opts::new(TXN_COUNT, "Target amount for completed requests"),
            labels,
        )?;
        let req_processed = IntCounterVec::new(
            Opts::new(OPERATIONS_COUNT, "Number of completed requests."),
            labels,
        )?;
        let sql_duration =
            duration_histogram(SQL_DURATION, "Duration of the sql requests", labels)?;
        let rec_duration =
            duration_histogram(OPERATIONS_DURATION, "Duration of the entire requests", labels)?;
        let api_duration =
            duration_histogram(API_DURATION, "Duration of the api requests", labels)?;

        registry.register(Box::new(info.clone()))?;
        registry.register(Box::new(req_processed.clone()))?;
        registry.register(Box::new(sql_duration.clone()))?;
        registry.register(Box::new(rec_duration.clone()))?;
        registry.register(Box::new(api_duration.clone()))?;

        Ok(Self {
            info,
            req_processed,
            sql_duration,
            rec_duration,
            api_duration,
        })
    }

    /// Sets the `txn_count` series for `label`.
    pub fn set_txn_count(&self, label: &str, value: f64) {
        self.info.with_label_values(&[label]).set(value);
    }

    /// Records a simulated query duration.
    pub fn record_query(&self, label: &str, elapsed: Duration) {
        self.sql_duration
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
    }

    /// Records one completed sub-task: its latency plus the completion count.
    pub fn record_task(&self, label: &str, elapsed: Duration) {
        self.api_duration
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
        self.req_processed.with_label_values(&[label]).inc();
    }

    /// Records the duration of a whole loop iteration.
    pub fn record_iteration(&self, label: &str, elapsed: Duration) {
        self.rec_duration
            .with_label_values(&[label])
            .observe(elapsed.as_secs_f64());
    }

    /// Current completion count for `label`.
    pub fn completed(&self, label: &str) -> u64 {
        self.req_processed.with_label_values(&[label]).get()
    }

    /// Current `txn_count` value for `label`.
    pub fn txn_count(&self, label: &str) -> f64 {
        self.info.with_label_values(&[label]).get()
    }
}

fn duration_histogram(name: &str, help: &str, labels: &[&str]) -> Result<HistogramVec> {
    let opts = HistogramOpts::new(name, help).buckets(DURATION_BUCKETS.to_vec());
    Ok(HistogramVec::new(opts, labels)?)
}

/// Owns a Prometheus registry and the batch metrics registered into it.
///
/// This is the handle passed around the process, usually behind an `Arc`.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    registry: Registry,
    pub batch: BatchMetrics,
}

impl MetricsRegistry {
    /// Creates a fresh registry and registers the batch metrics.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let batch = BatchMetrics::register(&registry)?;
        Ok(Self { registry, batch })
    }

    /// The underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metric families into the text exposition format.
    pub fn gather_text(&self) -> Result<String> {
        self.encode_with(&TextEncoder::new())
    }

    /// Encodes all metric families with `encoder`.
    pub fn encode_with<E: Encoder>(&self, encoder: &E) -> Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    #[test]
    fn test_register_and_record() {
        let registry = MetricsRegistry::new().expect("register metrics");
        let metrics = &registry.batch;

        metrics.set_txn_count("eft", 9752395.0);
        metrics.record_query("eft", Duration::from_millis(120));
        metrics.record_task("eft", Duration::from_millis(40));
        metrics.record_iteration("eft", Duration::from_millis(80));

        assert_eq!(registry.registry().gather().len(), METRIC_NAMES.len());
        let text = registry.gather_text().unwrap();
        for name in METRIC_NAMES {
            assert!(text.contains(&format!("# TYPE {name} ")), "missing {name}");
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        BatchMetrics::register(&registry).unwrap();

        assert_matches!(
            BatchMetrics::register(&registry),
            Err(Error::Prometheus(prometheus::Error::AlreadyReg))
        );
    }

    #[test]
    fn test_labels_keep_series_apart() {
        let registry = MetricsRegistry::new().unwrap();
        let metrics = &registry.batch;

        metrics.record_task("eft", Duration::from_millis(10));
        metrics.record_task("eft", Duration::from_millis(10));
        metrics.record_task("acc", Duration::from_millis(10));

        assert_eq!(metrics.completed("eft"), 2);
        assert_eq!(metrics.completed("acc"), 1);
        assert_eq!(
            metrics
                .api_duration
                .with_label_values(&["eft"])
                .get_sample_count(),
            2
        );
    }

    #[test]
    fn test_gather_text_uses_label_and_buckets() {
        let registry = MetricsRegistry::new().unwrap();
        registry.batch.set_txn_count("acc", 104565.0);
        registry.batch.record_query("acc", Duration::from_millis(120));

        let text = registry.gather_text().unwrap();
        assert!(text.contains("# HELP txn_count Target amount for completed requests"));
        assert!(text.contains("# TYPE lb_fs_sql_duration_seconds histogram"));
        assert!(text.contains(r#"txn_count{batch="acc"} 104565"#));
        assert!(text.contains(r#"lb_fs_sql_duration_seconds_bucket{batch="acc",le="0.1"} 0"#));
        assert!(text.contains(r#"lb_fs_sql_duration_seconds_bucket{batch="acc",le="0.15"} 1"#));
        assert!(text.contains(r#"lb_fs_sql_duration_seconds_bucket{batch="acc",le="+Inf"} 1"#));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Label values are not validated: every string gets its own series.
        #[test]
        fn prop_any_label_value_is_accepted(label in ".{0,24}", n in 1u64..20) {
            let registry = MetricsRegistry::new().unwrap();
            for _ in 0..n {
                registry.batch.record_task(&label, Duration::from_millis(1));
            }
            prop_assert_eq!(registry.batch.completed(&label), n);
            prop_assert!(registry.gather_text().is_ok());
        }
    }
}
