use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};

use crate::bench::BenchSettings;
use crate::metrics::LatencyRecorder;
use crate::monitor::MonitorSettings;
use crate::probe::DEFAULT_LATENCY_EVENT;

/// Redis round-trip benchmarking and Sentinel fleet latency monitoring.
#[derive(Debug, Parser)]
#[command(name = "redis-latency-watch", about)]
pub struct Cli {
    /// Logging verbosity (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive.
    #[arg(long, env = "REDIS_LATENCY_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Time sequential PINGs against one node and print the distribution.
    Bench(BenchConfig),
    /// Periodically probe every node named in a Sentinel config.
    Monitor(MonitorConfig),
    /// Print version information and exit.
    Version,
}

#[derive(Debug, Clone, Args)]
pub struct BenchConfig {
    /// Node to benchmark, as host:port.
    #[arg(long, env = "REDIS_LATENCY_ADDRESS", default_value = "127.0.0.1:6379")]
    pub address: String,

    /// Password sent with AUTH on connect.
    #[arg(long, env = "REDIS_LATENCY_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Number of PINGs to time.
    #[arg(short = 'n', long, env = "REDIS_LATENCY_ITERATIONS", default_value_t = 1_000)]
    pub iterations: u64,

    /// Samples kept for statistics.  Defaults to `iterations`.
    #[arg(long, env = "REDIS_LATENCY_RESERVOIR_SIZE")]
    pub reservoir_size: Option<usize>,

    /// Seed for the reservoir's sampler, for reproducible statistics.
    #[arg(long, env = "REDIS_LATENCY_SEED")]
    pub seed: Option<u64>,

    /// Per-call timeout for dialing and each PING.
    #[arg(long, env = "REDIS_LATENCY_TIMEOUT", default_value = "2s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Emit the report as JSON instead of a table.
    #[arg(long, env = "REDIS_LATENCY_JSON")]
    pub json: bool,

    /// Name stored in the report.
    #[arg(long, default_value = "test run")]
    pub name: String,
}

#[derive(Debug, Clone, Args)]
pub struct MonitorConfig {
    /// Sentinel configuration file holding the pod topology.
    #[arg(long, env = "REDIS_LATENCY_SENTINEL_CONFIG", default_value = "/etc/redis/sentinel.conf")]
    pub sentinel_config: PathBuf,

    /// Time between cycles.
    #[arg(long, env = "REDIS_LATENCY_INTERVAL", default_value = "60s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// `latency-monitor-threshold` pushed to every node, in milliseconds.
    #[arg(long, env = "REDIS_LATENCY_THRESHOLD", default_value_t = 50)]
    pub latency_threshold: u64,

    /// Upper bound on nodes probed at once, across overlapping cycles.
    #[arg(long, env = "REDIS_LATENCY_MAX_CONCURRENT_PROBES", default_value_t = 32)]
    pub max_concurrent_probes: usize,

    #[arg(long, env = "REDIS_LATENCY_DIAL_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub dial_timeout: Duration,

    #[arg(long, env = "REDIS_LATENCY_PROBE_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub probe_timeout: Duration,

    /// Event name passed to `LATENCY HISTORY`.
    #[arg(long, env = "REDIS_LATENCY_EVENT", default_value = DEFAULT_LATENCY_EVENT)]
    pub latency_event: String,

    /// Serve the status API on this address.
    #[arg(long, env = "REDIS_LATENCY_LISTEN")]
    pub listen: Option<SocketAddr>,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            bail!("iterations must be positive");
        }
        if self.reservoir_size == Some(0) {
            bail!("reservoir-size must be positive");
        }
        if self.timeout.is_zero() {
            bail!("timeout must be positive");
        }
        Ok(())
    }

    pub fn reservoir_capacity(&self) -> usize {
        self.reservoir_size
            .unwrap_or_else(|| usize::try_from(self.iterations).unwrap_or(usize::MAX))
    }

    pub fn recorder(&self) -> LatencyRecorder {
        match self.seed {
            Some(seed) => LatencyRecorder::with_seed(self.reservoir_capacity(), seed),
            None => LatencyRecorder::new(self.reservoir_capacity()),
        }
    }

    pub fn settings(&self) -> BenchSettings {
        BenchSettings {
            address: self.address.clone(),
            auth_token: self.auth_token.clone(),
            iterations: self.iterations,
            timeout: self.timeout,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            bail!("interval must be positive");
        }
        if self.max_concurrent_probes == 0 {
            bail!("max-concurrent-probes must be positive");
        }
        if self.dial_timeout.is_zero() || self.probe_timeout.is_zero() {
            bail!("timeouts must be positive");
        }
        if self.latency_event.is_empty() {
            bail!("latency-event must not be empty");
        }
        Ok(())
    }

    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            topology_path: self.sentinel_config.clone(),
            interval: self.interval,
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}
