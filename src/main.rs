mod bench;
mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod monitor;
mod node;
mod probe;
mod registry;
mod report;
mod server;
mod topology;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{BenchConfig, Cli, Command, MonitorConfig};
use crate::monitor::{MonitorContext, MonitorLoop};
use crate::node::redis_client::RedisConnector;
use crate::probe::LatencyProbe;
use crate::registry::NodeRegistry;
use crate::report::LatencyReport;
use crate::server::AppState;

/// Build-time version info.
mod version {
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Version = &cli.command {
        println!("redis-latency-watch {}", version::full());
        return Ok(());
    }

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    // stdout carries the report
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Bench(cfg) => run_bench(cfg).await,
        Command::Monitor(cfg) => run_monitor(cfg).await,
        Command::Version => Ok(()),
    }
}

async fn run_bench(cfg: BenchConfig) -> Result<()> {
    cfg.validate().context("invalid bench options")?;

    if !cfg.json {
        println!();
        println!("╔══════════════════════════════════════════════════╗");
        println!("║   🔬  RUST ↔ REDIS ROUND-TRIP BENCH              ║");
        println!("╚══════════════════════════════════════════════════╝");
        println!();
        println!("🔌 Pinging {} x{}...", cfg.address, cfg.iterations);
    }

    let recorder = cfg.recorder();
    let connector = RedisConnector::new(cfg.timeout);

    let totals = bench::run(&connector, &cfg.settings(), &recorder)
        .await
        .with_context(|| format!("benchmarking {}", cfg.address))?;

    let report = LatencyReport::from_recorder(&cfg.name, &recorder, totals)
        .with_context(|| format!("all {} pings to {} failed", cfg.iterations, cfg.address))?;

    if cfg.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        print!("{}", report.render_text());
    }

    Ok(())
}

async fn run_monitor(cfg: MonitorConfig) -> Result<()> {
    cfg.validate().context("invalid monitor options")?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting redis-latency-watch monitor",
    );

    // Fail fast on a missing file; every cycle re-reads it anyway.
    let initial = topology::load(&cfg.sentinel_config)
        .with_context(|| format!("loading topology from {}", cfg.sentinel_config.display()))?;
    tracing::info!(
        pods = initial.len(),
        sentinel_port = ?initial.port,
        "topology loaded",
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let registry = NodeRegistry::new(RedisConnector::new(cfg.dial_timeout), cfg.latency_threshold);
    let probe = LatencyProbe::new(cfg.probe_timeout, cfg.latency_event.clone());
    let ctx = Arc::new(MonitorContext::new(cfg.settings(), registry, probe));

    let status_server = cfg.listen.map(|addr| {
        let state = Arc::new(AppState {
            monitor: ctx.clone(),
        });
        tokio::spawn(server::serve(addr, state, cancel.clone()))
    });

    let outcome = MonitorLoop::new(ctx, cancel.clone()).run().await;
    cancel.cancel();

    if let Some(handle) = status_server {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "status server failed"),
            Err(e) => tracing::warn!(error = %e, "status server task failed"),
        }
    }

    outcome.context("monitor stopped")?;
    tracing::info!("redis-latency-watch stopped");

    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let sigterm = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        cancel.cancel();
    });
}
