//! Mixture of component distributions, sampled by first choosing a component
//! via an outer categorical, then sampling that component.
//!
//! For a small fixed fan-out (e.g. the three-way mixture MENTS/CZT uses to
//! combine a base policy, a uniform policy and a prior) a flat weighted
//! choice is cheaper than building an alias table; for a variable fan-out a
//! full [`CategoricalDistribution`] is used for the outer choice.

use std::hash::Hash;

use fxhash::FxHashMap;

use crate::distributions::alias::CategoricalDistribution;
use crate::rng::WorkerRng;

/// A small, fixed number of named weighted components, each sampled with its
/// own closure. Used where the fan-out is known at compile time (3-way mixes).
pub struct FlatMix<K: Clone> {
    components: Vec<(f64, Box<dyn Fn(&mut WorkerRng) -> Option<K> + Send + Sync>)>,
}

impl<K: Clone> FlatMix<K> {
    pub fn new() -> Self {
        FlatMix { components: Vec::new() }
    }

    pub fn with_component(
        mut self,
        weight: f64,
        sampler: impl Fn(&mut WorkerRng) -> Option<K> + Send + Sync + 'static,
    ) -> Self {
        if weight > 0.0 {
            self.components.push((weight, Box::new(sampler)));
        }
        self
    }

    pub fn sample(&self, rng: &mut WorkerRng) -> Option<K> {
        let total: f64 = self.components.iter().map(|(w, _)| w).sum();
        if total <= 0.0 || self.components.is_empty() {
            return None;
        }
        let mut x = rng.get_rand_uniform() * total;
        for (w, sampler) in &self.components {
            if x < *w {
                return sampler(rng);
            }
            x -= w;
        }
        self.components.last().and_then(|(_, s)| s(rng))
    }
}

impl<K: Clone> Default for FlatMix<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// A mixture over a variable number of named component distributions, chosen
/// via an outer alias-method categorical over component names.
pub struct MixedDistribution<C: Clone + Eq + Hash> {
    outer: CategoricalDistribution<C>,
    components: FxHashMap<C, CategoricalDistribution<C>>,
}

impl<C: Clone + Eq + Hash> MixedDistribution<C> {
    pub fn new(outer_weights: FxHashMap<C, f64>, components: FxHashMap<C, CategoricalDistribution<C>>) -> Self {
        MixedDistribution {
            outer: CategoricalDistribution::new(outer_weights, 1),
            components,
        }
    }

    pub fn sample(&self, rng: &mut WorkerRng) -> Option<C> {
        let component_key = self.outer.sample(rng)?;
        self.components.get(&component_key).and_then(|d| d.sample(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_mix_respects_component_weights() {
        let mix: FlatMix<&'static str> = FlatMix::new()
            .with_component(0.9, |_| Some("common"))
            .with_component(0.1, |_| Some("rare"));

        let mut rng = WorkerRng::from_seed(5);
        let mut rare = 0;
        for _ in 0..5_000 {
            if mix.sample(&mut rng) == Some("rare") {
                rare += 1;
            }
        }
        let frac = rare as f64 / 5_000.0;
        assert!((0.04..0.17).contains(&frac), "frac = {frac}");
    }

    #[test]
    fn zero_weight_component_never_fires() {
        let mix: FlatMix<&'static str> = FlatMix::new()
            .with_component(1.0, |_| Some("only"))
            .with_component(0.0, |_| Some("unreachable"));
        let mut rng = WorkerRng::from_seed(6);
        for _ in 0..200 {
            assert_eq!(Some("only"), mix.sample(&mut rng));
        }
    }
}
