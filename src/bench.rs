use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Error;
use crate::metrics::LatencyRecorder;
use crate::node::Connector;
use crate::probe::{LatencyProbe, DEFAULT_LATENCY_EVENT};
use crate::report::RunTotals;

/// One benchmark target.
#[derive(Debug, Clone)]
pub struct BenchSettings {
    pub address: String,
    pub auth_token: Option<String>,
    pub iterations: u64,
    pub timeout: Duration,
}

/// Single-run benchmark: dial once, then time `iterations` sequential PINGs
/// into `recorder`.
///
/// Strictly sequential; the only suspension point is the round trip
/// itself.  A dial failure is returned, a failed ping is counted and
/// skipped.
pub async fn run<C: Connector>(
    connector: &C,
    settings: &BenchSettings,
    recorder: &LatencyRecorder,
) -> Result<RunTotals, Error> {
    let conn = connector
        .connect(&settings.address, settings.auth_token.as_deref())
        .await?;
    debug!(node = %settings.address, "connected");

    let probe = LatencyProbe::new(settings.timeout, DEFAULT_LATENCY_EVENT);
    let started = Instant::now();
    let mut errors = 0u64;

    for iteration in 0..settings.iterations {
        match probe.measure_rtt(&settings.address, &conn).await {
            Ok(rtt) => recorder.record(rtt),
            Err(e) => {
                errors += 1;
                warn!(iteration, error = %e, "ping failed");
            }
        }
    }

    debug!(
        node = %settings.address,
        recorded = recorder.total_seen(),
        errors,
        "bench finished",
    );

    Ok(RunTotals {
        iterations: settings.iterations,
        errors,
        elapsed: started.elapsed(),
    })
}
