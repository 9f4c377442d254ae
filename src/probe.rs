use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::Error;
use crate::node::{NodeConnection, SpikeRecord};

/// Event name queried from `LATENCY HISTORY` unless configured otherwise.
pub const DEFAULT_LATENCY_EVENT: &str = "command";

/// Per-cycle verdict for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeHealth {
    /// The node logged at least one spike over its threshold.
    Latent { spikes: usize },
    NonLatent,
    /// Dial or history fetch failed this cycle.
    Unreachable { reason: String },
}

impl NodeHealth {
    /// Latent iff the history is non-empty, unreachable iff the fetch failed.
    pub fn classify(history: &Result<Vec<SpikeRecord>, Error>) -> Self {
        match history {
            Ok(records) if records.is_empty() => Self::NonLatent,
            Ok(records) => Self::Latent {
                spikes: records.len(),
            },
            Err(e) => Self::Unreachable {
                reason: e.to_string(),
            },
        }
    }
}

/// One-shot measurements against an established connection.  No retries:
/// the caller decides what a failure means.
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    timeout: Duration,
    event: String,
}

impl LatencyProbe {
    pub fn new(timeout: Duration, event: impl Into<String>) -> Self {
        Self {
            timeout,
            event: event.into(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Time one PING on the monotonic clock.
    pub async fn measure_rtt<C: NodeConnection>(
        &self,
        address: &str,
        conn: &C,
    ) -> Result<Duration, Error> {
        let start = Instant::now();
        self.bounded(address, conn.ping()).await?;
        Ok(start.elapsed())
    }

    /// The node's own spike log.  Unrelated to any RTT we measure.
    pub async fn fetch_spike_history<C: NodeConnection>(
        &self,
        address: &str,
        conn: &C,
    ) -> Result<Vec<SpikeRecord>, Error> {
        self.bounded(address, conn.latency_history(&self.event))
            .await
    }

    async fn bounded<T>(
        &self,
        address: &str,
        call: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| Error::probe(address, format!("timed out after {:?}", self.timeout)))?
    }
}
