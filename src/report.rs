use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

use crate::error::Result;
use crate::metrics::{LatencyRecorder, PercentileSet};

/// Percentile buckets reported for every run, highest first.
pub const BUCKETS: [f64; 5] = [0.99, 0.95, 0.90, 0.75, 0.50];

/// Summary of one benchmark run, shaped for an external store.
///
/// Reservoir-derived fields are nanoseconds; `full_stream_us` covers every
/// sample in microseconds.
#[derive(Debug, Clone, Serialize)]
pub struct LatencyReport {
    pub name: String,
    /// Percentile label (`"99.00"`) → nanoseconds.
    pub hist: BTreeMap<String, f64>,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub jitter: f64,
    pub timestamp: i64,
    pub unit: &'static str,
    pub iterations: u64,
    pub errors: u64,
    pub sampled: usize,
    /// Sum of the sampled round trips.
    pub sample_sum_ns: i64,
    /// Wall time of the whole run, including failed pings.
    pub total_elapsed_ns: u64,
    pub full_stream_us: Option<PercentileSet>,
}

/// Counters the caller kept while driving the recorder.
#[derive(Debug, Clone, Copy)]
pub struct RunTotals {
    pub iterations: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

pub fn bucket_label(p: f64) -> String {
    format!("{:.2}", p * 100.0)
}

impl LatencyReport {
    /// Fails with `EmptySnapshot` when nothing was recorded.
    pub fn from_recorder(name: &str, recorder: &LatencyRecorder, totals: RunTotals) -> Result<Self> {
        let snapshot = recorder.snapshot();
        let dist = snapshot.require()?;

        let hist = BUCKETS
            .iter()
            .map(|&p| bucket_label(p))
            .zip(dist.percentiles(&BUCKETS))
            .map(|(label, ns)| (label, ns as f64))
            .collect();

        Ok(Self {
            name: name.to_string(),
            hist,
            min: dist.min(),
            max: dist.max(),
            mean: dist.mean(),
            jitter: dist.std_dev(),
            timestamp: chrono::Utc::now().timestamp(),
            unit: "ns",
            iterations: totals.iterations,
            errors: totals.errors,
            sampled: dist.count(),
            sample_sum_ns: i64::try_from(dist.sum()).unwrap_or(i64::MAX),
            total_elapsed_ns: totals.elapsed.as_nanos() as u64,
            full_stream_us: recorder.stream_summary(),
        })
    }

    /// Human-readable percentile table.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let ok = self.iterations.saturating_sub(self.errors);

        let _ = writeln!(
            out,
            "{} iterations over {}, average {}/operation",
            self.sampled,
            fmt_ns(self.sample_sum_ns),
            fmt_ns(self.sample_sum_ns / self.sampled.max(1) as i64),
        );
        let _ = writeln!(
            out,
            "wall time {:?} for {} pings",
            Duration::from_nanos(self.total_elapsed_ns),
            self.iterations,
        );
        if self.errors > 0 {
            let _ = writeln!(out, "{} of {} pings failed", self.errors, self.iterations);
        }
        if (self.sampled as u64) < ok {
            let _ = writeln!(out, "statistics from a uniform sample of {} values", self.sampled);
        }

        let _ = writeln!(out, "\nPercentile breakout:");
        let _ = writeln!(out, "====================");
        for p in BUCKETS {
            if let Some(v) = self.hist.get(&bucket_label(p)) {
                let _ = writeln!(out, "{:>6}%: {}", bucket_label(p), fmt_ns(*v as i64));
            }
        }

        let _ = writeln!(out, "\nMin:    {}", fmt_ns(self.min));
        let _ = writeln!(out, "Max:    {}", fmt_ns(self.max));
        let _ = writeln!(out, "Mean:   {}", fmt_ns(self.mean as i64));
        let _ = writeln!(out, "Jitter: {}", fmt_ns(self.jitter as i64));

        if let Some(stream) = &self.full_stream_us {
            let _ = writeln!(
                out,
                "\nAll {} samples: p99 {}µs, p99.9 {}µs, max {}µs",
                stream.count, stream.p99, stream.p999, stream.max,
            );
        }
        out
    }
}

fn fmt_ns(ns: i64) -> String {
    let d = Duration::from_nanos(ns.unsigned_abs());
    if ns < 0 {
        format!("-{d:?}")
    } else {
        format!("{d:?}")
    }
}
