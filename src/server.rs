use axum::{middleware as axum_mw, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::metrics::RecorderSummary;
use crate::middleware::timing;
use crate::monitor::{MonitorContext, MonitorResult};
use crate::node::Connector;
use crate::registry::NodeStatus;

/// Read side of a running monitor, independent of the connector type.
pub trait MonitorStatus: Send + Sync {
    fn latest(&self) -> Option<MonitorResult>;
    fn nodes(&self) -> Vec<NodeStatus>;
    fn cycle_durations(&self) -> RecorderSummary;
}

impl<C: Connector> MonitorStatus for MonitorContext<C> {
    fn latest(&self) -> Option<MonitorResult> {
        MonitorContext::latest(self)
    }

    fn nodes(&self) -> Vec<NodeStatus> {
        self.registry.nodes()
    }

    fn cycle_durations(&self) -> RecorderSummary {
        self.cycle_durations.summary()
    }
}

/// Shared state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub monitor: Arc<dyn MonitorStatus>,
}

/// Builds the status `Router`.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::latest_health))
        .route("/api/health/stream", get(handlers::health::health_stream))
        .route("/api/nodes", get(handlers::health::list_nodes))
        .route("/api/metrics", get(handlers::health::cycle_metrics))
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CorsLayer::permissive())
}

/// Serve until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "status server listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::monitor::run_cycle;
    use crate::monitor::tests::{context, write_topology};
    use crate::node::fake::{FakeConnector, FakeNode};

    async fn get_json(addr: SocketAddr, path: &str) -> (u16, serde_json::Value) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        let status = raw[9..12].parse().unwrap();
        let body = raw.split("\r\n\r\n").nth(1).unwrap_or_default();
        (status, serde_json::from_str(body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn health_endpoint_reflects_the_latest_cycle() {
        let path = write_topology(&[("a", 7101)]);
        let fake = FakeConnector::with_nodes([("10.0.0.1:7101", FakeNode::latent(3))]);
        let ctx = context(&path, fake, Duration::from_secs(60), 2);
        let state = Arc::new(AppState {
            monitor: ctx.clone(),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, create_router(state))
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        let (status, body) = get_json(addr, "/api/health").await;
        assert_eq!(status, 404);
        assert_eq!(body["status"], 404);

        run_cycle(ctx, CancellationToken::new()).await.unwrap();

        let (status, body) = get_json(addr, "/api/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["latent_count"], 1);

        let (_, nodes) = get_json(addr, "/api/nodes").await;
        assert_eq!(nodes[0]["address"], "10.0.0.1:7101");
        assert_eq!(nodes[0]["last_health"]["state"], "latent");
        assert_eq!(nodes[0]["last_health"]["spikes"], 3);

        let (_, metrics) = get_json(addr, "/api/metrics").await;
        assert_eq!(metrics["cycle_duration"]["total_seen"], 1);

        cancel.cancel();
        server.await.unwrap().unwrap();
        std::fs::remove_file(path).unwrap();
    }
}
