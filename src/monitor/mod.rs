//! Fleet monitor: every tick, re-read the Sentinel topology, probe every
//! node for self-reported latency spikes and publish the aggregate.

mod cycle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Error;
use crate::metrics::LatencyRecorder;
use crate::node::Connector;
use crate::probe::LatencyProbe;
use crate::registry::NodeRegistry;

pub use cycle::run_cycle;

/// How many cycle durations the context keeps a uniform sample of.
const CYCLE_SAMPLE_SIZE: usize = 1_024;

/// Aggregate health of one cycle.  Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorResult {
    pub cycle_id: Uuid,
    pub latent_count: usize,
    pub non_latent_count: usize,
    pub unreachable_count: usize,
    /// Distinct node addresses targeted this cycle.
    pub nodes: usize,
    /// Unix seconds at which the cycle finished.
    pub timestamp: i64,
    pub duration_ms: u64,
    /// Shutdown interrupted the cycle before every node was probed.
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub topology_path: PathBuf,
    pub interval: Duration,
    pub max_concurrent_probes: usize,
}

/// Everything a cycle needs, built once at startup and shared by `Arc`.
pub struct MonitorContext<C: Connector> {
    pub settings: MonitorSettings,
    pub registry: NodeRegistry<C>,
    pub probe: LatencyProbe,
    /// Shared by overlapping cycles, so the cap is per process.
    pub permits: Arc<Semaphore>,
    pub cycle_durations: Arc<LatencyRecorder>,
    results: watch::Sender<Option<MonitorResult>>,
}

impl<C: Connector> MonitorContext<C> {
    pub fn new(settings: MonitorSettings, registry: NodeRegistry<C>, probe: LatencyProbe) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_probes.max(1)));
        let (results, _) = watch::channel(None);

        Self {
            settings,
            registry,
            probe,
            permits,
            cycle_durations: Arc::new(LatencyRecorder::new(CYCLE_SAMPLE_SIZE)),
            results,
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<Option<MonitorResult>> {
        self.results.subscribe()
    }

    pub fn latest(&self) -> Option<MonitorResult> {
        self.results.borrow().clone()
    }

    fn publish(&self, result: MonitorResult) {
        self.results.send_replace(Some(result));
    }
}

/// Fixed-interval driver.  Ticks spawn cycles without waiting for earlier
/// ones, so cycles may overlap; each one is tracked in a `JoinSet` and
/// drained on shutdown.
pub struct MonitorLoop<C: Connector> {
    ctx: Arc<MonitorContext<C>>,
    cancel: CancellationToken,
}

impl<C: Connector> MonitorLoop<C> {
    pub fn new(ctx: Arc<MonitorContext<C>>, cancel: CancellationToken) -> Self {
        Self { ctx, cancel }
    }

    /// Runs until cancelled or until a cycle hits a topology file error,
    /// which is returned after in-flight cycles have drained.
    pub async fn run(self) -> Result<(), Error> {
        let mut ticker = tokio::time::interval(self.ctx.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles: JoinSet<Result<MonitorResult, Error>> = JoinSet::new();
        let mut fatal = None;

        info!(
            topology = %self.ctx.settings.topology_path.display(),
            interval = ?self.ctx.settings.interval,
            max_concurrent_probes = self.ctx.settings.max_concurrent_probes,
            latency_event = self.ctx.probe.event(),
            "monitor loop started",
        );

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    if let Some(e) = reap(joined) {
                        error!(error = %e, "monitor cycle aborted, stopping");
                        fatal = Some(e);
                        self.cancel.cancel();
                        break;
                    }
                }

                _ = ticker.tick() => {
                    cycles.spawn(run_cycle(self.ctx.clone(), self.cancel.clone()));
                }
            }
        }

        if !cycles.is_empty() {
            info!(in_flight = cycles.len(), "draining monitor cycles");
        }
        while let Some(joined) = cycles.join_next().await {
            if let Some(e) = reap(joined) {
                fatal.get_or_insert(e);
            }
        }

        info!("monitor loop stopped");
        fatal.map_or(Ok(()), Err)
    }
}

/// Returns the error that should stop the loop, if any.
fn reap(joined: Result<Result<MonitorResult, Error>, tokio::task::JoinError>) -> Option<Error> {
    match joined {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(e),
        Err(e) => {
            error!(error = %e, "monitor cycle task failed");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::node::fake::{FakeConnector, FakeNode};

    /// Writes a topology file with one `monitor` line per `(name, port)`
    /// on 10.0.0.1.
    pub(crate) fn write_topology(pods: &[(&str, u16)]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sentinel-{}.conf", Uuid::new_v4()));
        let mut text = String::from("port 26379\n");
        for (name, port) in pods {
            text.push_str(&format!("sentinel monitor {name} 10.0.0.1 {port} 2\n"));
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    pub(crate) fn context(
        path: &Path,
        fake: FakeConnector,
        interval: Duration,
        max_concurrent_probes: usize,
    ) -> Arc<MonitorContext<FakeConnector>> {
        Arc::new(MonitorContext::new(
            MonitorSettings {
                topology_path: path.to_path_buf(),
                interval,
                max_concurrent_probes,
            },
            NodeRegistry::new(fake, 50),
            LatencyProbe::new(Duration::from_secs(5), "command"),
        ))
    }

    #[tokio::test]
    async fn loop_publishes_until_cancelled() {
        let path = write_topology(&[("a", 6379), ("b", 6380)]);
        let fake = FakeConnector::with_nodes([
            ("10.0.0.1:6379", FakeNode::latent(1)),
            ("10.0.0.1:6380", FakeNode::quiet()),
        ]);
        let ctx = context(&path, fake, Duration::from_millis(20), 4);
        let mut results = ctx.subscribe();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(MonitorLoop::new(ctx.clone(), cancel.clone()).run());

        results.changed().await.unwrap();
        let first = results.borrow().clone().unwrap();
        assert_eq!(first.latent_count, 1);
        assert_eq!(first.non_latent_count, 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert!(ctx.cycle_durations.total_seen() >= 1);
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_topology_stops_the_loop_with_an_error() {
        let ctx = context(
            Path::new("/nonexistent/sentinel.conf"),
            FakeConnector::default(),
            Duration::from_millis(10),
            4,
        );
        let cancel = CancellationToken::new();

        let err = MonitorLoop::new(ctx.clone(), cancel.clone())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConfigFile { .. }));
        assert!(cancel.is_cancelled());
        assert!(ctx.latest().is_none());
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_no_probes() {
        let path = write_topology(&[("a", 6379)]);
        let fake = FakeConnector::with_nodes([("10.0.0.1:6379", FakeNode::quiet())]);
        let ctx = context(&path, fake.clone(), Duration::from_millis(10), 4);
        let cancel = CancellationToken::new();
        cancel.cancel();

        MonitorLoop::new(ctx, cancel).run().await.unwrap();
        assert_eq!(fake.history_calls(), 0);
        std::fs::remove_file(path).unwrap();
    }
}
