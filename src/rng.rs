//! Per-worker seeded randomness.
//!
//! Every worker owns one [`WorkerRng`]; its seed is derived from a
//! manager-scoped base seed and the worker id so that a run is reproducible
//! thread-by-thread even though trials themselves interleave non-deterministically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, StandardNormal};

/// A worker's seeded pseudo-random source.
pub struct WorkerRng {
    inner: StdRng,
}

impl WorkerRng {
    /// Derives a worker's seed from a manager-scoped base seed and its id.
    /// Uses `splitmix64`-style mixing so that nearby worker ids do not yield
    /// correlated streams under `StdRng`'s seeding.
    pub fn for_worker(base_seed: u64, worker_id: usize) -> Self {
        let mut z = base_seed.wrapping_add((worker_id as u64).wrapping_mul(0x9E3779B97F4A7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^= z >> 31;
        WorkerRng {
            inner: StdRng::seed_from_u64(z),
        }
    }

    #[cfg(test)]
    pub fn from_seed(seed: u64) -> Self {
        WorkerRng {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// A uniform integer in the half-open range `[lo, hi)`.
    pub fn get_rand_int(&mut self, lo: usize, hi: usize) -> usize {
        assert!(lo < hi, "get_rand_int requires lo < hi");
        self.inner.gen_range(lo..hi)
    }

    /// A uniform float in `[0, 1)`.
    pub fn get_rand_uniform(&mut self) -> f64 {
        self.inner.gen::<f64>()
    }

    /// An `Exp(1)` draw, used to sample points uniformly on the simplex via
    /// normalised exponentials (the Dirichlet(1,...,1) trick).
    pub fn get_rand_exp(&mut self) -> f64 {
        Exp1.sample(&mut self.inner)
    }

    /// A Bernoulli draw with success probability `p`.
    pub fn get_rand_bool(&mut self, p: f64) -> bool {
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }

    /// A standard-normal draw.
    pub fn get_rand_gaussian(&mut self) -> f64 {
        StandardNormal.sample(&mut self.inner)
    }

    /// Samples a uniform-random point on the `(dim-1)`-simplex by drawing
    /// `dim` i.i.d. `Exp(1)` variates and normalising them to sum to one.
    pub fn sample_simplex_weight(&mut self, dim: usize) -> Vec<f64> {
        let mut draws: Vec<f64> = (0..dim).map(|_| self.get_rand_exp()).collect();
        let total: f64 = draws.iter().sum();
        if total > 0.0 {
            for d in draws.iter_mut() {
                *d /= total;
            }
        } else {
            let uniform = 1.0 / dim as f64;
            draws.iter_mut().for_each(|d| *d = uniform);
        }
        draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn different_worker_ids_give_different_streams() {
        let mut a = WorkerRng::for_worker(42, 0);
        let mut b = WorkerRng::for_worker(42, 1);
        let draws_a: Vec<usize> = (0..8).map(|_| a.get_rand_int(0, 1_000_000)).collect();
        let draws_b: Vec<usize> = (0..8).map(|_| b.get_rand_int(0, 1_000_000)).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn same_seed_and_worker_id_reproduce() {
        let mut a = WorkerRng::for_worker(7, 3);
        let mut b = WorkerRng::for_worker(7, 3);
        for _ in 0..16 {
            assert_eq!(a.get_rand_uniform(), b.get_rand_uniform());
        }
    }

    #[test]
    fn simplex_weight_sums_to_one_and_is_nonnegative() {
        let mut rng = WorkerRng::from_seed(1);
        for _ in 0..50 {
            let w = rng.sample_simplex_weight(4);
            assert_eq!(4, w.len());
            assert!(w.iter().all(|&x| x >= 0.0));
            let sum: f64 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rand_int_respects_bounds() {
        let mut rng = WorkerRng::from_seed(2);
        for _ in 0..200 {
            let x = rng.get_rand_int(5, 9);
            assert!((5..9).contains(&x));
        }
    }
}
