//! The node protocol as seen by the registry and the probes.
//!
//! Production code talks to Redis through [`redis_client::RedisConnector`]; tests
//! plug in an in-memory connector so the monitor loop can run without a
//! network.

#[cfg(test)]
pub mod fake;
pub mod redis_client;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Error;

/// One entry of a node's own `LATENCY HISTORY` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpikeRecord {
    /// Unix seconds at which the node logged the spike.
    pub timestamp: i64,
    pub latency_ms: u64,
}

/// Replication role reported by `ROLE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Replica,
    Sentinel,
    Other(String),
}

impl NodeRole {
    pub fn from_reply(role: &str) -> Self {
        match role {
            "master" => Self::Master,
            "slave" | "replica" => Self::Replica,
            "sentinel" => Self::Sentinel,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Replica => f.write_str("replica"),
            Self::Sentinel => f.write_str("sentinel"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// An established connection to one node.
#[async_trait]
pub trait NodeConnection: Send + Sync + 'static {
    /// Cheapest possible round trip.
    async fn ping(&self) -> Result<(), Error>;

    /// `CONFIG SET latency-monitor-threshold <ms>`.
    async fn set_latency_threshold(&self, millis: u64) -> Result<(), Error>;

    async fn role(&self) -> Result<NodeRole, Error>;

    /// The node's self-reported spikes for `event` (e.g. `command`).
    async fn latency_history(&self, event: &str) -> Result<Vec<SpikeRecord>, Error>;
}

/// Dials nodes.  Failures are [`Error::Connection`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: NodeConnection;

    async fn connect(
        &self,
        address: &str,
        auth_token: Option<&str>,
    ) -> Result<Self::Connection, Error>;
}
