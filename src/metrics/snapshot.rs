use crate::error::{Error, Result};

/// Immutable, sorted view of a reservoir at one instant.
///
/// Statistics only exist on the populated variant, so an empty run can
/// never be mistaken for one that measured zeros.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Empty,
    Populated(Distribution),
}

/// Sorted sample set plus the closed-form statistics derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    values: Vec<i64>,
    sum: i128,
    mean: f64,
    std_dev: f64,
}

impl Snapshot {
    /// Sorts `values` ascending and derives the summary statistics.
    pub fn from_values(mut values: Vec<i64>) -> Self {
        if values.is_empty() {
            return Self::Empty;
        }
        values.sort_unstable();
        Self::Populated(Distribution::from_sorted(values))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn count(&self) -> usize {
        self.values().len()
    }

    /// Sorted values; empty slice for an empty snapshot.
    pub fn values(&self) -> &[i64] {
        match self {
            Self::Empty => &[],
            Self::Populated(d) => d.values(),
        }
    }

    pub fn distribution(&self) -> Option<&Distribution> {
        match self {
            Self::Empty => None,
            Self::Populated(d) => Some(d),
        }
    }

    /// Like [`Snapshot::distribution`], for callers that treat an empty
    /// snapshot as an error.
    pub fn require(&self) -> Result<&Distribution> {
        self.distribution().ok_or(Error::EmptySnapshot)
    }

    pub fn percentile(&self, p: f64) -> Option<i64> {
        self.distribution().map(|d| d.percentile(p))
    }
}

impl Distribution {
    fn from_sorted(values: Vec<i64>) -> Self {
        let n = values.len() as f64;
        let sum: i128 = values.iter().map(|&v| i128::from(v)).sum();
        let mean = sum as f64 / n;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        Self {
            values,
            sum,
            mean,
            std_dev: variance.sqrt(),
        }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn min(&self) -> i64 {
        self.values[0]
    }

    pub fn max(&self) -> i64 {
        self.values[self.values.len() - 1]
    }

    pub fn sum(&self) -> i128 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation (divides by N), reported as jitter.
    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    /// Value at index `ceil(p * count) - 1`, clamped into range.
    ///
    /// For an even count the 50th percentile is the lower middle value.
    pub fn percentile(&self, p: f64) -> i64 {
        let count = self.values.len();
        let rank = (p * count as f64).ceil() as i64 - 1;
        let idx = rank.clamp(0, count as i64 - 1) as usize;
        self.values[idx]
    }

    pub fn percentiles(&self, ps: &[f64]) -> Vec<i64> {
        ps.iter().map(|&p| self.percentile(p)).collect()
    }
}
