//! fs-loader metrics harness
//!
//! Runs the simulated `eft` / `acc` batch loaders once while serving their
//! labelled metrics on `/metrics`.
//!
//! ```text
//! ┌───────────────────┐   record    ┌───────────────────┐   scrape   ┌────────────┐
//! │  Workload Runner  │────────────▶│  MetricsRegistry  │◀───────────│ /metrics   │
//! └───────────────────┘             └───────────────────┘            └────────────┘
//! ```
//!
//! The process exits with status 0 once the workload completes, unless
//! `--keep-serving` is set, in which case it serves until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fs_loader_metrics::config::{
    parse_addr, Batch, ServerConfig, WorkloadConfig, DEFAULT_METRICS_ADDR,
};
use fs_loader_metrics::error::{Error, Result};
use fs_loader_metrics::{MetricsRegistry, MetricsServer, WorkloadRunner};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Simulated batch loaders exposing labelled Prometheus metrics
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = DEFAULT_METRICS_ADDR)]
    metrics_addr: String,

    /// Number of loop iterations per batch
    #[arg(long, env = "ITERATIONS", default_value = "200")]
    iterations: u32,

    /// Upper bound of the simulated SQL query sleep, in milliseconds
    #[arg(long, env = "QUERY_MAX_MS", default_value = "10000")]
    query_max_ms: u64,

    /// Upper bound of each simulated sub-task sleep, in milliseconds
    #[arg(long, env = "TASK_MAX_MS", default_value = "5000")]
    task_max_ms: u64,

    /// Keep serving /metrics after the workload finishes
    #[arg(long, env = "KEEP_SERVING")]
    keep_serving: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            batches: vec![Batch::eft(), Batch::acc()],
            iterations: self.iterations,
            query_max: Duration::from_millis(self.query_max_ms),
            task_max: Duration::from_millis(self.task_max_ms),
        }
    }

    fn server_config(&self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            listen_addr: parse_addr(&self.metrics_addr)?,
            keep_serving: self.keep_serving,
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let workload_config = args.workload_config();
    let server_config = args.server_config()?;

    info!("Starting fs-loader metrics harness");
    info!("  Metrics address: {}", server_config.listen_addr);
    info!("  Iterations: {}", workload_config.iterations);
    info!("  Query sleep bound: {:?}", workload_config.query_max);
    info!("  Task sleep bound: {:?}", workload_config.task_max);
    info!("  Keep serving: {}", server_config.keep_serving);

    let metrics = Arc::new(MetricsRegistry::new()?);
    let runner = WorkloadRunner::new(workload_config, metrics.clone())?;
    let shutdown = CancellationToken::new();

    let server = MetricsServer::bind(server_config.listen_addr).await?;
    let server_handle = tokio::spawn(server.serve(metrics.clone(), shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let runner_token = shutdown.clone();
    let keep_serving = server_config.keep_serving;
    let runner_handle = tokio::spawn(async move {
        let summary = runner.run(runner_token.clone()).await;
        if !keep_serving {
            runner_token.cancel();
        }
        summary
    });

    // A failed listener is logged; the workload still runs to completion.
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Metrics server error: {}", e),
        Err(e) => error!("Metrics server task failed: {}", e),
    }

    let summary = runner_handle
        .await
        .map_err(|e| Error::Internal(format!("Workload task failed: {}", e)))?;

    info!(
        iterations = summary.iterations,
        cancelled = summary.cancelled,
        completed = ?summary.completed,
        "Workload finished"
    );
    info!("Shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["fs-loader-metrics"]).unwrap();
        let workload = args.workload_config();
        assert_eq!(workload.iterations, 200);
        assert_eq!(workload.query_max, Duration::from_secs(10));
        assert_eq!(workload.task_max, Duration::from_secs(5));

        let server = args.server_config().unwrap();
        assert_eq!(server.listen_addr.port(), 9000);
        assert!(!server.keep_serving);
    }

    #[test]
    fn test_overrides() {
        let args = Args::try_parse_from([
            "fs-loader-metrics",
            "--metrics-addr",
            "127.0.0.1:9100",
            "--iterations",
            "3",
            "--task-max-ms",
            "10",
            "--keep-serving",
        ])
        .unwrap();
        assert_eq!(args.workload_config().iterations, 3);
        assert_eq!(args.workload_config().task_max, Duration::from_millis(10));
        assert_eq!(args.server_config().unwrap().listen_addr.port(), 9100);
        assert!(args.server_config().unwrap().keep_serving);
    }

    #[test]
    fn test_bad_address_rejected() {
        let args =
            Args::try_parse_from(["fs-loader-metrics", "--metrics-addr", "nowhere"]).unwrap();
        assert!(matches!(
            args.server_config(),
            Err(Error::InvalidAddress { .. })
        ));
    }
}
