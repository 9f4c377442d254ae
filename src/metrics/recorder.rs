use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;
use super::reservoir::UniformReservoir;
use super::snapshot::Snapshot;

// ─── Configuration ───────────────────────────────────────────────

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

// ─── Public types ────────────────────────────────────────────────

/// Thread-safe latency recorder.
///
/// Callers hold an `Arc<LatencyRecorder>` returned at construction; there is
/// no name-based lookup.  Probes call `record()`, reporters call
/// `snapshot()` / `stream_summary()`.
pub struct LatencyRecorder {
    inner: Mutex<Inner>,
}

/// Serializable view used by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct RecorderSummary {
    pub total_seen: u64,
    pub sampled: usize,
    pub min_ns: Option<i64>,
    pub max_ns: Option<i64>,
    pub mean_ns: Option<f64>,
    pub jitter_ns: Option<f64>,
    pub p50_ns: Option<i64>,
    pub p99_ns: Option<i64>,
    pub full_stream_us: Option<PercentileSet>,
}

// ─── Internal state ──────────────────────────────────────────────

struct Inner {
    reservoir: UniformReservoir,
    // Every sample, microseconds
    stream_hist: Histogram<u64>,
}

// ─── LatencyRecorder impl ────────────────────────────────────────

impl LatencyRecorder {
    pub fn new(capacity: usize) -> Self {
        Self::from_reservoir(UniformReservoir::new(capacity))
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::from_reservoir(UniformReservoir::with_seed(capacity, seed))
    }

    fn from_reservoir(reservoir: UniformReservoir) -> Self {
        Self {
            inner: Mutex::new(Inner {
                reservoir,
                stream_hist: new_histogram(),
            }),
        }
    }

    /// Record one measured duration.
    pub fn record(&self, elapsed: Duration) {
        let ns = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.record_nanos(ns);
    }

    /// Record a raw nanosecond sample.  Negative values reach the reservoir
    /// untouched; the histogram clamps to its 1 μs floor.
    pub fn record_nanos(&self, ns: i64) {
        let us = (ns.max(0) as u64 / 1_000).clamp(HIST_LOW, HIST_HIGH);

        let mut inner = self.inner.lock();
        inner.reservoir.update(ns);
        let _ = inner.stream_hist.record(us);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock().reservoir.snapshot()
    }

    pub fn stream_summary(&self) -> Option<PercentileSet> {
        PercentileSet::from_histogram(&self.inner.lock().stream_hist)
    }

    pub fn total_seen(&self) -> u64 {
        self.inner.lock().reservoir.total_seen()
    }

    pub fn summary(&self) -> RecorderSummary {
        let (snapshot, total_seen, full_stream_us) = {
            let inner = self.inner.lock();
            (
                inner.reservoir.snapshot(),
                inner.reservoir.total_seen(),
                PercentileSet::from_histogram(&inner.stream_hist),
            )
        };
        let dist = snapshot.distribution();

        RecorderSummary {
            total_seen,
            sampled: snapshot.count(),
            min_ns: dist.map(|d| d.min()),
            max_ns: dist.map(|d| d.max()),
            mean_ns: dist.map(|d| d.mean()),
            jitter_ns: dist.map(|d| d.std_dev()),
            p50_ns: snapshot.percentile(0.50),
            p99_ns: snapshot.percentile(0.99),
            full_stream_us,
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
        .expect("static histogram bounds are valid")
}
