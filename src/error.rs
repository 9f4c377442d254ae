use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the latency engine, the topology loader and the node
/// protocol.  Only `ConfigFile` is fatal to a monitor run; everything else is
/// recorded against a single node or a single report.
#[derive(Debug, Error)]
pub enum Error {
    /// Topology file missing or unreadable.
    #[error("cannot read topology file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Dial or auth failure against a node.
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// Round trip or history fetch failed on an established connection.
    #[error("probe of {address} failed: {reason}")]
    Probe { address: String, reason: String },

    /// Statistics were requested from a snapshot holding no samples.
    #[error("no samples recorded")]
    EmptySnapshot,
}

impl Error {
    pub fn connection(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn probe(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Probe {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
