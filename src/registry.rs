use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::node::{Connector, NodeConnection, NodeRole};
use crate::probe::NodeHealth;
use crate::topology::PodConfig;

/// A node the monitor has reached at least once.
///
/// The connection slot is replaced wholesale on reconnect; the node itself
/// lives until the registry is dropped.
pub struct Node<T> {
    address: String,
    pod: String,
    connection: RwLock<Option<Arc<T>>>,
    role: Mutex<Option<NodeRole>>,
    last_health: Mutex<Option<NodeHealth>>,
}

impl<T> Node<T> {
    fn new(address: String, pod: String) -> Self {
        Self {
            address,
            pod,
            connection: RwLock::new(None),
            role: Mutex::new(None),
            last_health: Mutex::new(None),
        }
    }

    pub fn connection(&self) -> Option<Arc<T>> {
        self.connection.read().clone()
    }

    pub fn role(&self) -> Option<NodeRole> {
        self.role.lock().clone()
    }

    pub fn last_health(&self) -> Option<NodeHealth> {
        self.last_health.lock().clone()
    }

    pub fn record_health(&self, health: NodeHealth) {
        *self.last_health.lock() = Some(health);
    }

    /// Install `conn` unless another caller got there first.  Returns the
    /// live connection and whether it is ours.
    fn install(&self, conn: Arc<T>) -> (Arc<T>, bool) {
        let mut slot = self.connection.write();
        match slot.as_ref() {
            Some(live) => (live.clone(), false),
            None => {
                *slot = Some(conn.clone());
                (conn, true)
            }
        }
    }
}

/// A node together with the connection a caller should use for this probe.
pub struct ResolvedNode<T> {
    pub node: Arc<Node<T>>,
    pub connection: Arc<T>,
}

impl<T> Clone for ResolvedNode<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            connection: self.connection.clone(),
        }
    }
}

/// Reporting view of one registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub address: String,
    pub pod: String,
    pub role: Option<NodeRole>,
    pub connected: bool,
    pub last_health: Option<NodeHealth>,
}

/// Owns one logical connection per node address.
///
/// Lookups and inserts go through a single `RwLock`; no lock is held across
/// an `.await`, so dialing never blocks other resolvers.
pub struct NodeRegistry<C: Connector> {
    connector: C,
    latency_threshold_ms: u64,
    nodes: RwLock<HashMap<String, Arc<Node<C::Connection>>>>,
}

impl<C: Connector> NodeRegistry<C> {
    pub fn new(connector: C, latency_threshold_ms: u64) -> Self {
        Self {
            connector,
            latency_threshold_ms,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Cached connection for the pod's address, or a freshly dialed one.
    ///
    /// A new connection gets the latency threshold pushed and its role read
    /// exactly once.  Dial failures cache nothing.
    pub async fn resolve(&self, pod: &PodConfig) -> Result<ResolvedNode<C::Connection>, Error> {
        let address = pod.address();

        let cached = self.nodes.read().get(&address).cloned();
        if let Some(node) = cached {
            if let Some(connection) = node.connection() {
                return Ok(ResolvedNode { node, connection });
            }
        }

        let dialed = Arc::new(
            self.connector
                .connect(&address, pod.auth_token.as_deref())
                .await?,
        );

        let (node, connection, fresh) = {
            let mut nodes = self.nodes.write();
            let node = nodes
                .entry(address.clone())
                .or_insert_with(|| Arc::new(Node::new(address.clone(), pod.name.clone())))
                .clone();
            let (connection, fresh) = node.install(dialed);
            (node, connection, fresh)
        };

        if fresh {
            info!(node = %address, pod = %pod.name, "connected");
            self.configure(&node, connection.as_ref()).await;
        } else {
            debug!(node = %address, "lost connect race, reusing live connection");
        }

        Ok(ResolvedNode { node, connection })
    }

    async fn configure(&self, node: &Node<C::Connection>, conn: &C::Connection) {
        if let Err(e) = conn.set_latency_threshold(self.latency_threshold_ms).await {
            warn!(node = %node.address, error = %e, "unable to enable latency monitoring");
        }
        match conn.role().await {
            Ok(role) => *node.role.lock() = Some(role),
            Err(e) => debug!(node = %node.address, error = %e, "role query failed"),
        }
    }

    /// Drop the node's connection if it is still `resolved.connection`, so
    /// the next `resolve` redials.  A newer connection is left alone.
    pub fn invalidate(&self, resolved: &ResolvedNode<C::Connection>) -> bool {
        let mut slot = resolved.node.connection.write();
        match slot.as_ref() {
            Some(live) if Arc::ptr_eq(live, &resolved.connection) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, address: &str) -> Option<Arc<Node<C::Connection>>> {
        self.nodes.read().get(address).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Status of every known node, ordered by address.
    pub fn nodes(&self) -> Vec<NodeStatus> {
        let mut out: Vec<NodeStatus> = self
            .nodes
            .read()
            .values()
            .map(|n| NodeStatus {
                address: n.address.clone(),
                pod: n.pod.clone(),
                role: n.role(),
                connected: n.connection.read().is_some(),
                last_health: n.last_health(),
            })
            .collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}
