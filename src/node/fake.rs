//! In-memory nodes for exercising the registry and the monitor loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connector, NodeConnection, NodeRole, SpikeRecord};
use crate::error::Error;

/// How a fake node behaves.  Unknown addresses refuse to dial.
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    pub spikes: usize,
    pub refuse_dial: bool,
    pub fail_probes: bool,
    pub fail_config: bool,
    pub delay: Duration,
}

impl FakeNode {
    pub fn latent(spikes: usize) -> Self {
        Self {
            spikes,
            ..Self::default()
        }
    }

    pub fn quiet() -> Self {
        Self::default()
    }

    pub fn down() -> Self {
        Self {
            refuse_dial: true,
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            fail_probes: true,
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct State {
    nodes: Mutex<HashMap<String, FakeNode>>,
    dials: Mutex<HashMap<String, usize>>,
    thresholds: Mutex<Vec<(String, u64)>>,
    history_calls: AtomicUsize,
}

/// Cloneable handle; clones share state so a test can keep one and hand
/// another to the registry.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<State>,
}

impl FakeConnector {
    pub fn with_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (S, FakeNode)>,
        S: Into<String>,
    {
        let connector = Self::default();
        for (addr, node) in nodes {
            connector.set(addr, node);
        }
        connector
    }

    pub fn set(&self, address: impl Into<String>, node: FakeNode) {
        self.state.nodes.lock().insert(address.into(), node);
    }

    pub fn dials(&self, address: &str) -> usize {
        self.state.dials.lock().get(address).copied().unwrap_or(0)
    }

    pub fn thresholds(&self) -> Vec<(String, u64)> {
        self.state.thresholds.lock().clone()
    }

    pub fn history_calls(&self) -> usize {
        self.state.history_calls.load(Ordering::SeqCst)
    }

    fn node(&self, address: &str) -> Option<FakeNode> {
        self.state.nodes.lock().get(address).cloned()
    }
}

pub struct FakeConnection {
    address: String,
    connector: FakeConnector,
}

impl FakeConnection {
    fn behaviour(&self) -> Result<FakeNode, Error> {
        self.connector
            .node(&self.address)
            .ok_or_else(|| Error::probe(&self.address, "node vanished"))
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(
        &self,
        address: &str,
        _auth_token: Option<&str>,
    ) -> Result<FakeConnection, Error> {
        *self.state.dials.lock().entry(address.to_string()).or_default() += 1;

        match self.node(address) {
            Some(node) if !node.refuse_dial => Ok(FakeConnection {
                address: address.to_string(),
                connector: self.clone(),
            }),
            _ => Err(Error::connection(address, "connection refused")),
        }
    }
}

#[async_trait]
impl NodeConnection for FakeConnection {
    async fn ping(&self) -> Result<(), Error> {
        let node = self.behaviour()?;
        tokio::time::sleep(node.delay).await;
        if node.fail_probes {
            return Err(Error::probe(&self.address, "broken pipe"));
        }
        Ok(())
    }

    async fn set_latency_threshold(&self, millis: u64) -> Result<(), Error> {
        if self.behaviour()?.fail_config {
            return Err(Error::probe(&self.address, "ERR CONFIG SET disabled"));
        }
        self.connector
            .state
            .thresholds
            .lock()
            .push((self.address.clone(), millis));
        Ok(())
    }

    async fn role(&self) -> Result<NodeRole, Error> {
        Ok(NodeRole::Master)
    }

    async fn latency_history(&self, _event: &str) -> Result<Vec<SpikeRecord>, Error> {
        self.connector
            .state
            .history_calls
            .fetch_add(1, Ordering::SeqCst);

        let node = self.behaviour()?;
        tokio::time::sleep(node.delay).await;
        if node.fail_probes {
            return Err(Error::probe(&self.address, "broken pipe"));
        }
        Ok((0..node.spikes)
            .map(|i| SpikeRecord {
                timestamp: 1_700_000_000 + i as i64,
                latency_ms: 120,
            })
            .collect())
    }
}
