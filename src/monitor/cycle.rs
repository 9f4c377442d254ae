use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MonitorContext, MonitorResult};
use crate::error::Error;
use crate::node::Connector;
use crate::probe::NodeHealth;
use crate::topology::{self, PodConfig};

#[derive(Default)]
struct Tally {
    latent: usize,
    non_latent: usize,
    unreachable: usize,
    skipped: usize,
}

impl Tally {
    fn add(&mut self, outcome: Option<NodeHealth>) {
        match outcome {
            Some(NodeHealth::Latent { .. }) => self.latent += 1,
            Some(NodeHealth::NonLatent) => self.non_latent += 1,
            Some(NodeHealth::Unreachable { .. }) => self.unreachable += 1,
            None => self.skipped += 1,
        }
    }
}

/// One monitor cycle.
///
/// Only a topology file error is returned; node failures are folded into
/// the counts.  Counts do not depend on the order probes complete in.
pub async fn run_cycle<C: Connector>(
    ctx: Arc<MonitorContext<C>>,
    cancel: CancellationToken,
) -> Result<MonitorResult, Error> {
    let cycle_id = Uuid::new_v4();
    let started = Instant::now();

    let topology = topology::load_async(&ctx.settings.topology_path).await?;
    if topology.is_empty() {
        warn!(
            %cycle_id,
            path = %ctx.settings.topology_path.display(),
            "topology declares no pods",
        );
    }
    let pods = topology.len();

    // One probe per address, even when several pods share a primary.
    let mut targets: BTreeMap<String, PodConfig> = BTreeMap::new();
    for pod in topology.pods.into_values() {
        targets.entry(pod.address()).or_insert(pod);
    }
    let nodes = targets.len();
    info!(%cycle_id, pods, nodes, "checking nodes for latency");

    let mut tally = Tally::default();
    let mut workers = JoinSet::new();

    for (address, pod) in targets {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = ctx.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            tally.add(None);
            continue;
        };

        let ctx = ctx.clone();
        let cancel = cancel.clone();
        workers.spawn(async move {
            let outcome = probe_node(&ctx, &cancel, &address, &pod).await;
            drop(permit);
            outcome
        });
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(outcome) => tally.add(outcome),
            Err(e) => {
                warn!(%cycle_id, error = %e, "probe worker failed");
                tally.add(Some(NodeHealth::Unreachable {
                    reason: e.to_string(),
                }));
            }
        }
    }

    let elapsed = started.elapsed();
    let result = MonitorResult {
        cycle_id,
        latent_count: tally.latent,
        non_latent_count: tally.non_latent,
        unreachable_count: tally.unreachable,
        nodes,
        timestamp: chrono::Utc::now().timestamp(),
        duration_ms: elapsed.as_millis() as u64,
        interrupted: tally.skipped > 0,
    };

    info!(
        %cycle_id,
        latent = result.latent_count,
        non_latent = result.non_latent_count,
        unreachable = result.unreachable_count,
        skipped = tally.skipped,
        known_nodes = ctx.registry.len(),
        rss_bytes = resident_memory_bytes().unwrap_or(0),
        duration_ms = result.duration_ms,
        "latency check complete",
    );

    ctx.cycle_durations.record(elapsed);
    ctx.publish(result.clone());
    Ok(result)
}

/// Resident set size of this process, from `/proc/self/status`.  `None`
/// where procfs is unavailable.
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss_bytes(&status)
}

fn parse_vm_rss_bytes(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let kb = line.strip_prefix("VmRSS:")?.split_whitespace().next()?;
        kb.parse::<u64>().ok().map(|kb| kb.saturating_mul(1024))
    })
}

/// Resolve and probe a single node.  `None` when shutdown got there first.
async fn probe_node<C: Connector>(
    ctx: &MonitorContext<C>,
    cancel: &CancellationToken,
    address: &str,
    pod: &PodConfig,
) -> Option<NodeHealth> {
    if cancel.is_cancelled() {
        return None;
    }

    let resolved = match ctx.registry.resolve(pod).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(node = %address, pod = %pod.name, error = %e, "node unreachable");
            let health = NodeHealth::Unreachable {
                reason: e.to_string(),
            };
            if let Some(node) = ctx.registry.get(address) {
                node.record_health(health.clone());
            }
            return Some(health);
        }
    };

    if cancel.is_cancelled() {
        return None;
    }

    let history = ctx
        .probe
        .fetch_spike_history(address, resolved.connection.as_ref())
        .await;
    let health = NodeHealth::classify(&history);

    match &history {
        Err(e) => {
            warn!(node = %address, error = %e, "latency history failed, dropping connection");
            ctx.registry.invalidate(&resolved);
        }
        Ok(spikes) if !spikes.is_empty() => {
            debug!(node = %address, spikes = spikes.len(), "node reports latency spikes");
        }
        Ok(_) => {}
    }

    resolved.node.record_health(health.clone());
    Some(health)
}
