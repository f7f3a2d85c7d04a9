//! Workload generators.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic generator of record payloads and keys.
pub struct Workload {
    rng: StdRng,
    min_len: usize,
    max_len: usize,
}

impl Workload {
    /// Creates a generator producing payloads of `min_len..=max_len` bytes.
    /// A `max_len` below `min_len` is raised to it.
    pub fn new(seed: u64, min_len: usize, max_len: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            min_len,
            max_len: max_len.max(min_len),
        }
    }

    /// Next payload.
    pub fn payload(&mut self) -> Vec<u8> {
        let len = self.rng.gen_range(self.min_len..=self.max_len);
        (&mut self.rng).sample_iter(&Alphanumeric).take(len).collect()
    }

    /// `count` distinct keys below `u64::MAX`, in random order.
    pub fn keys(&mut self, count: usize) -> Vec<u64> {
        let mut keys: Vec<u64> = (0..count as u64).map(|k| k * 7 + 1).collect();
        for i in (1..keys.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            keys.swap(i, j);
        }
        keys
    }
}
