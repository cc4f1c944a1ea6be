//! Categorical distribution over a hashable outcome set, sampled in `O(1)`
//! via Vose's alias method, with an amortised-`O(1)` `update`.
//!
//! This is the templated variant where `reconstruct_alias_table_freq` governs
//! how often `update` actually rebuilds the table: the distribution is
//! allowed to run slightly stale between rebuilds, trading accuracy for
//! write throughput.

use std::hash::Hash;

use fxhash::FxHashMap;

use crate::rng::WorkerRng;

/// One slot of the alias table: sampling picks a slot uniformly, then returns
/// `first` with probability `threshold`, else `second`.
#[derive(Debug, Clone)]
struct AliasEntry<K> {
    threshold: f64,
    first: K,
    second: K,
}

/// An alias-method categorical distribution over outcomes of type `K`.
#[derive(Debug, Clone)]
pub struct CategoricalDistribution<K: Clone + Eq + Hash> {
    weights: FxHashMap<K, f64>,
    order: Vec<K>,
    table: Vec<AliasEntry<K>>,
    reconstruct_alias_table_freq: u32,
    updates_since_rebuild: u32,
    dirty: bool,
}

impl<K: Clone + Eq + Hash> CategoricalDistribution<K> {
    /// Builds a distribution from a mapping of outcomes to non-negative
    /// weights (need not sum to 1; any positive total is normalised away).
    pub fn new(weights: FxHashMap<K, f64>, reconstruct_alias_table_freq: u32) -> Self {
        let order: Vec<K> = weights.keys().cloned().collect();
        let mut dist = CategoricalDistribution {
            weights,
            order,
            table: Vec::new(),
            reconstruct_alias_table_freq: reconstruct_alias_table_freq.max(1),
            updates_since_rebuild: 0,
            dirty: true,
        };
        dist.rebuild();
        dist
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Sets (or inserts) the weight for `key`. Whether this triggers an
    /// immediate rebuild of the alias table depends on
    /// `reconstruct_alias_table_freq`: the table becomes amortised `O(1)` to
    /// update when it is only rebuilt every N updates.
    pub fn update(&mut self, key: K, weight: f64) {
        if !self.weights.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.weights.insert(key, weight.max(0.0));
        self.dirty = true;
        self.updates_since_rebuild += 1;
        if self.updates_since_rebuild >= self.reconstruct_alias_table_freq {
            self.rebuild();
        }
    }

    /// Forces an immediate rebuild regardless of the staleness budget.
    pub fn force_rebuild(&mut self) {
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.updates_since_rebuild = 0;
        self.dirty = false;
        let n = self.order.len();
        self.table.clear();
        if n == 0 {
            return;
        }

        let total: f64 = self.order.iter().map(|k| self.weights[k]).sum();
        let scale = if total > 0.0 { n as f64 / total } else { 0.0 };

        // probability[i] is the scaled weight of order[i], averaging to 1.
        let mut probability: Vec<f64> = self.order.iter().map(|k| self.weights[k] * scale).collect();

        let mut small: Vec<usize> = Vec::new();
        let mut large: Vec<usize> = Vec::new();
        for (i, p) in probability.iter().enumerate() {
            if *p < 1.0 {
                small.push(i);
            } else {
                large.push(i);
            }
        }

        self.table = (0..n)
            .map(|i| AliasEntry {
                threshold: 1.0,
                first: self.order[i].clone(),
                second: self.order[i].clone(),
            })
            .collect();

        while let (Some(s), Some(l)) = (small.pop(), large.pop()) {
            self.table[s].threshold = probability[s];
            self.table[s].second = self.order[l].clone();

            probability[l] = (probability[l] + probability[s]) - 1.0;
            if probability[l] < 1.0 {
                small.push(l);
            } else {
                large.push(l);
            }
        }
        // Residuals are clamped to 1.0: numerical drift can leave entries in
        // either bucket fractionally off from their ideal threshold.
        for i in large {
            self.table[i].threshold = 1.0;
        }
        for i in small {
            self.table[i].threshold = 1.0;
        }
    }

    /// Samples one outcome. `O(1)`.
    pub fn sample(&self, rng: &mut WorkerRng) -> Option<K> {
        if self.table.is_empty() {
            return None;
        }
        let slot = rng.get_rand_int(0, self.table.len());
        let entry = &self.table[slot];
        if rng.get_rand_uniform() < entry.threshold {
            Some(entry.first.clone())
        } else {
            Some(entry.second.clone())
        }
    }

    pub fn weight_of(&self, key: &K) -> Option<f64> {
        self.weights.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::WorkerRng;

    fn dist_of(pairs: &[(&str, f64)], freq: u32) -> CategoricalDistribution<String> {
        let map: FxHashMap<String, f64> = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        CategoricalDistribution::new(map, freq)
    }

    #[test]
    fn alias_sampling_matches_weights() {
        let dist = dist_of(&[("A", 0.3), ("B", 0.7)], 1);
        let mut rng = WorkerRng::from_seed(123);
        let mut count_a = 0;
        for _ in 0..10_000 {
            if dist.sample(&mut rng).unwrap() == "A" {
                count_a += 1;
            }
        }
        assert!((2750..=3250).contains(&count_a), "count_a = {count_a}");
    }

    #[test]
    fn update_respects_reconstruct_frequency() {
        let mut dist = dist_of(&[("A", 0.3), ("B", 0.7)], 2);
        // First update alone must not yet rebuild (it is still stale).
        dist.update("A".to_string(), 20.0);
        // Second update crosses the threshold and forces the rebuild.
        dist.update("B".to_string(), 80.0);

        let mut rng = WorkerRng::from_seed(321);
        let mut count_a = 0;
        for _ in 0..10_000 {
            if dist.sample(&mut rng).unwrap() == "A" {
                count_a += 1;
            }
        }
        assert!((1750..=2250).contains(&count_a), "count_a = {count_a}");
    }

    #[test]
    fn rebuild_from_scratch_matches_incremental_update() {
        let mut incremental = dist_of(&[("A", 1.0), ("B", 1.0), ("C", 1.0)], 1);
        incremental.update("A".to_string(), 5.0);

        let from_scratch = dist_of(&[("A", 5.0), ("B", 1.0), ("C", 1.0)], 1);

        assert_eq!(incremental.weight_of(&"A".to_string()), from_scratch.weight_of(&"A".to_string()));
        assert_eq!(incremental.len(), from_scratch.len());
    }

    #[test]
    fn single_outcome_always_sampled() {
        let dist = dist_of(&[("only", 4.2)], 1);
        let mut rng = WorkerRng::from_seed(9);
        for _ in 0..50 {
            assert_eq!(Some("only".to_string()), dist.sample(&mut rng));
        }
    }
}
