//! Sentinel topology: which pods (primary + replicas) this host monitors.
//!
//! The topology is rebuilt from the Sentinel configuration file on every
//! monitor cycle; nothing is merged with a previous parse.

pub mod parser;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;

pub use parser::{load, load_async};
use parser::Directive;

/// One `sentinel monitor` declaration, plus its auth token if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodConfig {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub quorum: u32,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    /// Peer sentinels watching this pod.  `known-sentinel` lines are not
    /// interpreted, so this stays empty after a file parse.
    pub sentinels: BTreeSet<String>,
}

impl PodConfig {
    pub fn new(name: impl Into<String>, ip: impl Into<String>, port: u16, quorum: u32) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            port,
            quorum,
            auth_token: None,
            sentinels: BTreeSet::new(),
        }
    }

    /// `ip:port` of the pod's primary; the registry key for its node.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Result of one parse: pods keyed by name, plus what the file says about
/// the local sentinel itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub pods: BTreeMap<String, PodConfig>,
    pub port: Option<u16>,
    pub dir: Option<PathBuf>,
    pub bind: Option<String>,
}

impl TopologySnapshot {
    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    /// Apply one directive.  Every variant is handled here.
    pub fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Monitor(pod) => self.add_pod(pod),
            Directive::AuthPass { name, token } => match self.pods.get_mut(&name) {
                Some(pod) => pod.auth_token = Some(token),
                None => tracing::debug!(pod = %name, "auth-pass for unknown pod ignored"),
            },
            Directive::Ignored(_) => {}
            Directive::Port(port) => self.port = Some(port),
            Directive::Dir(dir) => self.dir = Some(dir),
            Directive::Bind(host) => self.bind = Some(host),
        }
    }

    fn add_pod(&mut self, pod: PodConfig) {
        if let Some(existing) = self.pods.get(&pod.name) {
            tracing::warn!(
                pod = %pod.name,
                kept = %existing.address(),
                ignored = %pod.address(),
                "duplicate monitor directive, keeping first",
            );
            return;
        }

        // Pods are keyed by name; two names sharing an address are both kept
        // but the overlap is worth surfacing.
        let address = pod.address();
        if let Some(other) = self.pods.values().find(|p| p.address() == address) {
            tracing::warn!(
                pod = %pod.name,
                other = %other.name,
                address = %address,
                "monitor directive reuses an address already claimed by another pod",
            );
        }

        self.pods.insert(pod.name.clone(), pod);
    }
}
