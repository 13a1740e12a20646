//! Workload Runner
//!
//! Emulates two batch loaders writing into the same metric vectors. There
//! is no real work: every "query" and "sub-task" is a random sleep whose
//! measured duration is recorded under the batch's label.
//!
//! # Sequence
//!
//! 1. For each batch: set `txn_count`, sleep in `[0, query_max)`, record
//!    `lb_fs_sql_duration_seconds`.
//! 2. `iterations` times: for each batch sleep in `[0, task_max)`, record
//!    `lb_fs_api_duration_seconds` and bump `lb_fs_etl_operations_count`;
//!    then record the whole iteration into `lb_fs_etl_operations_seconds`
//!    for every batch.
//!
//! Everything runs sequentially on the calling task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::metrics::MetricsRegistry;

// =============================================================================
// Run Summary
// =============================================================================

/// Completion count of a single batch at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCompletion {
    pub label: String,
    pub completed: u64,
}

/// Outcome of one [`WorkloadRunner::run`]
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Loop iterations fully completed
    pub iterations: u32,

    /// Completion counter per batch, in batch order
    pub completed: Vec<BatchCompletion>,

    /// Whether the run stopped early on shutdown
    pub cancelled: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// =============================================================================
// Workload Runner
// =============================================================================

/// Drives the simulated batches and records into the shared metrics
pub struct WorkloadRunner {
    config: WorkloadConfig,
    metrics: Arc<MetricsRegistry>,
}

impl WorkloadRunner {
    /// Create a new runner
    pub fn new(config: WorkloadConfig, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, metrics })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Runs the workload with a freshly seeded generator.
    ///
    /// Sleep durations are not reproducible between runs.
    pub async fn run(&self, shutdown: CancellationToken) -> RunSummary {
        let mut rng = StdRng::from_entropy();
        self.run_with_rng(&mut rng, shutdown).await
    }

    /// Runs the workload drawing sleep durations from `rng`.
    ///
    /// Returns early, with `cancelled` set, once `shutdown` is cancelled.
    #[instrument(skip_all, fields(iterations = self.config.iterations))]
    pub async fn run_with_rng<R: Rng + Send>(
        &self,
        rng: &mut R,
        shutdown: CancellationToken,
    ) -> RunSummary {
        let started_at = Utc::now();
        let mut iterations = 0;

        let finished = self.simulate_queries(rng, &shutdown).await
            && self.simulate_loop(rng, &shutdown, &mut iterations).await;

        if !finished {
            warn!(iterations, "Workload cancelled before completion");
        }

        let completed = self
            .config
            .batches
            .iter()
            .map(|batch| BatchCompletion {
                label: batch.label.clone(),
                completed: self.metrics.batch.completed(&batch.label),
            })
            .collect();

        RunSummary {
            iterations,
            completed,
            cancelled: !finished,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn simulate_queries<R: Rng + Send>(
        &self,
        rng: &mut R,
        shutdown: &CancellationToken,
    ) -> bool {
        let metrics = &self.metrics.batch;

        for batch in &self.config.batches {
            let start = Instant::now();
            metrics.set_txn_count(&batch.label, batch.target_count);

            let nap = random_duration(rng, self.config.query_max);
            info!(
                batch = %batch.name,
                sleep_ms = nap.as_millis() as u64,
                "Simulating SQL query"
            );
            if !pause(nap, shutdown).await {
                return false;
            }

            metrics.record_query(&batch.label, start.elapsed());
        }

        true
    }

    async fn simulate_loop<R: Rng + Send>(
        &self,
        rng: &mut R,
        shutdown: &CancellationToken,
        iterations: &mut u32,
    ) -> bool {
        let metrics = &self.metrics.batch;

        for iteration in 0..self.config.iterations {
            let iteration_start = Instant::now();

            for batch in &self.config.batches {
                let task_start = Instant::now();
                let nap = random_duration(rng, self.config.task_max);
                debug!(
                    batch = %batch.name,
                    iteration,
                    sleep_ms = nap.as_millis() as u64,
                    "Simulating sub-task"
                );
                if !pause(nap, shutdown).await {
                    return false;
                }

                metrics.record_task(&batch.label, task_start.elapsed());
            }

            let elapsed = iteration_start.elapsed();
            for batch in &self.config.batches {
                metrics.record_iteration(&batch.label, elapsed);
            }

            *iterations += 1;
            info!(
                iteration,
                elapsed_ms = elapsed.as_millis() as u64,
                "Iteration complete"
            );
        }

        true
    }
}

/// Uniform whole-millisecond duration in `[0, max)`; zero when `max` is
/// below one millisecond.
pub fn random_duration<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.gen_range(0..max_ms))
}

/// Sleeps for `duration`. Returns `false` if `shutdown` fired first.
async fn pause(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
