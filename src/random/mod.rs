//! Reproducible randomness for a simulation run.
//!
//! A run owns exactly one [`RandomSource`], which is passed explicitly to every stochastic
//! operation. The source never hands out a shared, stateful generator. Instead each caller
//! asks for a generator derived from
//!
//! * the base seed of the run,
//! * the name of a stream declared with [`define_rng!`], and
//! * an `(iteration, key)` pair naming the entity the draw belongs to (a person, a
//!   container, or a whole campaign on one day).
//!
//! Because the derived generator only depends on these inputs, results do not depend on the
//! order in which entities are evaluated, on how work is split across threads, or on whether
//! a run was resumed from a snapshot.

mod macros;

use log::trace;
use serde::{Deserialize, Serialize};

pub use macros::define_rng;

use crate::hashing::{hash_key, hash_str};
use crate::rand::{Rng, SeedableRng};

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng + Rng;
    fn get_name() -> &'static str;
}

/// The per-run source of all random draws.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomSource {
    base_seed: u64,
}

impl RandomSource {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        trace!("initializing random source with base seed {base_seed}");
        RandomSource { base_seed }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Derives the seed of stream `R` for the entity `key` on `iteration`.
    #[must_use]
    pub fn derive_seed<R: RngId>(&self, _rng_id: R, iteration: i64, key: u64) -> u64 {
        let stream_seed = self.base_seed.wrapping_add(hash_str(R::get_name()));
        stream_seed ^ hash_key(iteration, key)
    }

    /// Creates a generator for the entity `key` on `iteration`. Two calls with the same
    /// arguments return generators producing the same sequence.
    #[must_use]
    pub fn rng<R: RngId>(&self, rng_id: R, iteration: i64, key: u64) -> R::RngType {
        R::RngType::seed_from_u64(self.derive_seed(rng_id, iteration, key))
    }

    /// Applies `sampler` to a freshly derived generator.
    pub fn sample<R: RngId, T>(
        &self,
        rng_id: R,
        iteration: i64,
        key: u64,
        sampler: impl FnOnce(&mut R::RngType) -> T,
    ) -> T {
        let mut rng = self.rng(rng_id, iteration, key);
        sampler(&mut rng)
    }

    /// Gets a random boolean value which is true with probability `p`.
    pub fn sample_bool<R: RngId>(&self, rng_id: R, iteration: i64, key: u64, p: f64) -> bool {
        let p = crate::numeric::clamp_unit(p);
        self.sample(rng_id, iteration, key, |rng| rng.random_bool(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rand::RngCore;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    fn same_inputs_same_sequence() {
        let random = RandomSource::new(42);
        let mut a = random.rng(FooRng, 3, 17);
        let mut b = random.rng(FooRng, 3, 17);
        for _ in 0..10 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn streams_are_independent() {
        let random = RandomSource::new(42);
        assert_ne!(
            random.sample(FooRng, 1, 0, RngCore::next_u64),
            random.sample(BarRng, 1, 0, RngCore::next_u64)
        );
    }

    #[test]
    fn entities_and_iterations_are_independent() {
        let random = RandomSource::new(42);
        let base = random.sample(FooRng, 1, 0, RngCore::next_u64);
        assert_ne!(base, random.sample(FooRng, 2, 0, RngCore::next_u64));
        assert_ne!(base, random.sample(FooRng, 1, 1, RngCore::next_u64));
    }

    #[test]
    fn reset_seed() {
        let run_0 = RandomSource::new(42).sample(FooRng, 5, 5, RngCore::next_u64);
        assert_eq!(
            run_0,
            RandomSource::new(42).sample(FooRng, 5, 5, RngCore::next_u64)
        );
        assert_ne!(
            run_0,
            RandomSource::new(88).sample(FooRng, 5, 5, RngCore::next_u64)
        );
    }

    #[test]
    fn sample_bool_extremes() {
        let random = RandomSource::new(7);
        for key in 0..100 {
            assert!(random.sample_bool(FooRng, 1, key, 1.0));
            assert!(!random.sample_bool(FooRng, 1, key, 0.0));
            assert!(!random.sample_bool(FooRng, 1, key, -3.0));
        }
    }

    #[test]
    fn sample_bool_frequency() {
        let random = RandomSource::new(42);
        let hits = (0..3000)
            .filter(|key| random.sample_bool(BarRng, 1, *key, 1.0 / 3.0))
            .count();
        // The expected value of `hits` is 1000.
        assert!((i64::try_from(hits).unwrap() - 1000).abs() < 100);
    }
}
