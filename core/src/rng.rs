//! Seeded random streams.
//!
//! Every random decision in the park (guest arrivals, breakdowns, guest
//! choices) draws from a `SimRng` derived from one master seed. Each concern
//! gets its own stream so adding a draw in one place never shifts another.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, seedable RNG for a single concern.
pub struct SimRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SimRng {
    pub fn new(master_seed: u64, stream: RngStream) -> Self {
        let derived_seed = master_seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            name: stream.name(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Seed from OS entropy. Used by the binaries when no seed is given.
    pub fn from_entropy(stream: RngStream) -> Self {
        Self::new(rand::random(), stream)
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n). `n` must be > 0.
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

/// Stable stream assignments. Append only: reordering changes every seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    Admission = 0,
    Breakage  = 1,
    Visit     = 2,
}

impl RngStream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admission => "admission",
            Self::Breakage  => "breakage",
            Self::Visit     => "visit",
        }
    }
}
