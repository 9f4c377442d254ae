use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use crate::metrics::RecorderSummary;
use crate::monitor::MonitorResult;
use crate::registry::NodeStatus;
use crate::server::AppState;

use super::AppError;

#[derive(Debug, Serialize)]
pub struct CycleMetrics {
    pub cycle_duration: RecorderSummary,
}

// ─── GET /api/health ─────────────────────────────────────────────
/// Latest aggregate health record.

pub async fn latest_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MonitorResult>, AppError> {
    state
        .monitor
        .latest()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no monitor cycle has completed yet".into()))
}

// ─── GET /api/health/stream ──────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes the latest `MonitorResult` every 5 s once one exists.

pub async fn health_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_secs(5));

    let stream = IntervalStream::new(interval).filter_map(move |_| {
        let latest = state.monitor.latest()?;
        let json = serde_json::to_string(&latest).unwrap_or_default();
        Some(Ok(Event::default().event("health").data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// ─── GET /api/nodes ──────────────────────────────────────────────

pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Json<Vec<NodeStatus>> {
    Json(state.monitor.nodes())
}

// ─── GET /api/metrics ────────────────────────────────────────────
/// Cycle duration statistics, in nanoseconds.

pub async fn cycle_metrics(State(state): State<Arc<AppState>>) -> Json<CycleMetrics> {
    Json(CycleMetrics {
        cycle_duration: state.monitor.cycle_durations(),
    })
}
