use hdrhistogram::Histogram;
use serde::Serialize;

/// Full-stream percentile breakdown taken from an HdrHistogram.
///
/// The reservoir keeps a uniform sample; this set covers every recorded
/// value, so the true tail and max survive even when the reservoir has
/// evicted them.  Values are microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub p999: u64,
    pub count: u64,
}

impl PercentileSet {
    /// `None` when the histogram has no observations.
    pub fn from_histogram(hist: &Histogram<u64>) -> Option<Self> {
        if hist.is_empty() {
            return None;
        }

        Some(Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_quantile(0.50),
            p95: hist.value_at_quantile(0.95),
            p99: hist.value_at_quantile(0.99),
            p999: hist.value_at_quantile(0.999),
            count: hist.len(),
        })
    }
}
