use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{Connector, NodeConnection, NodeRole, SpikeRecord};
use crate::error::Error;

/// Dials Redis nodes as `ConnectionManager`s.
///
/// `ConnectionManager` is cheaply cloneable; every clone shares the same
/// multiplexed TCP connection, so concurrent probes from overlapping cycles
/// can share one handle.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    dial_timeout: Duration,
}

impl RedisConnector {
    pub fn new(dial_timeout: Duration) -> Self {
        Self { dial_timeout }
    }
}

/// Live connection to one node.
#[derive(Clone)]
pub struct RedisConnection {
    address: String,
    manager: ConnectionManager,
}

impl RedisConnection {
    fn probe_err(&self, e: redis::RedisError) -> Error {
        Error::probe(&self.address, e)
    }
}

/// Split `host:port`, tolerating bracketed IPv6 hosts.
fn split_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(
        &self,
        address: &str,
        auth_token: Option<&str>,
    ) -> Result<RedisConnection, Error> {
        let (host, port) = split_address(address)
            .ok_or_else(|| Error::connection(address, "expected host:port"))?;

        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(host, port),
            redis: redis::RedisConnectionInfo {
                password: auth_token.map(str::to_string),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info).map_err(|e| Error::connection(address, e))?;

        let manager = tokio::time::timeout(self.dial_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                Error::connection(address, format!("timed out after {:?}", self.dial_timeout))
            })?
            .map_err(|e| Error::connection(address, e))?;

        Ok(RedisConnection {
            address: address.to_string(),
            manager,
        })
    }
}

#[async_trait]
impl NodeConnection for RedisConnection {
    async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.probe_err(e))?;
        Ok(())
    }

    async fn set_latency_threshold(&self, millis: u64) -> Result<(), Error> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg("latency-monitor-threshold")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.probe_err(e))?;
        Ok(())
    }

    async fn role(&self) -> Result<NodeRole, Error> {
        let mut conn = self.manager.clone();
        let reply: Vec<redis::Value> = redis::cmd("ROLE")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.probe_err(e))?;

        let role: String = reply
            .first()
            .map(redis::from_redis_value::<String>)
            .transpose()
            .map_err(|e| self.probe_err(e))?
            .ok_or_else(|| Error::probe(&self.address, "empty ROLE reply"))?;
        Ok(NodeRole::from_reply(&role))
    }

    async fn latency_history(&self, event: &str) -> Result<Vec<SpikeRecord>, Error> {
        let mut conn = self.manager.clone();
        // Each entry is a [unix-seconds, latency-ms] pair.
        let entries: Vec<(i64, u64)> = redis::cmd("LATENCY")
            .arg("HISTORY")
            .arg(event)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.probe_err(e))?;

        Ok(entries
            .into_iter()
            .map(|(timestamp, latency_ms)| SpikeRecord {
                timestamp,
                latency_ms,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_addresses() {
        assert_eq!(
            split_address("127.0.0.1:6379"),
            Some(("127.0.0.1".into(), 6379))
        );
        assert_eq!(split_address("[::1]:6380"), Some(("::1".into(), 6380)));
        assert_eq!(split_address("localhost"), None);
        assert_eq!(split_address(":6379"), None);
        assert_eq!(split_address("host:port"), None);
    }

    #[tokio::test]
    async fn malformed_address_fails_without_dialing() {
        let connector = RedisConnector::new(Duration::from_millis(50));
        let err = connector.connect("no-port-here", None).await.err().unwrap();
        assert!(matches!(err, Error::Connection { .. }));
    }
}
