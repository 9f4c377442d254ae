use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::snapshot::Snapshot;

/// Fixed-capacity uniform sample of an unbounded stream (Algorithm R).
///
/// Until `capacity` values have been offered every value is kept.  After
/// that each new value replaces a random slot with probability
/// `capacity / total_seen`, so the stored values are always a uniform
/// sample of everything ever offered.
#[derive(Debug)]
pub struct UniformReservoir {
    values: Vec<i64>,
    capacity: usize,
    total_seen: u64,
    rng: StdRng,
}

impl UniformReservoir {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_entropy())
    }

    /// Deterministic reservoir, mostly useful for reproducible runs.
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
            total_seen: 0,
            rng,
        }
    }

    /// Offer one sample.  Any value is accepted, including zero and negatives.
    pub fn update(&mut self, value: i64) {
        self.total_seen += 1;

        if self.values.len() < self.capacity {
            self.values.push(value);
            return;
        }
        if self.capacity == 0 {
            return;
        }

        // k in [0, total_seen): hit probability is capacity / total_seen
        let k = self.rng.gen_range(0..self.total_seen);
        if k < self.capacity as u64 {
            self.values[k as usize] = value;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_values(self.values.clone())
    }

    /// Every sample ever offered, stored or not.
    pub fn total_seen(&self) -> u64 {
        self.total_seen
    }
}
