//! Discrete uniform distribution over a finite key list.

use crate::rng::WorkerRng;

#[derive(Debug, Clone)]
pub struct DiscreteUniform<K: Clone> {
    keys: Vec<K>,
}

impl<K: Clone> DiscreteUniform<K> {
    pub fn new(keys: Vec<K>) -> Self {
        DiscreteUniform { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn sample(&self, rng: &mut WorkerRng) -> Option<K> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = rng.get_rand_int(0, self.keys.len());
        Some(self.keys[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_only_known_keys() {
        let dist = DiscreteUniform::new(vec!["a", "b", "c"]);
        let mut rng = WorkerRng::from_seed(1);
        for _ in 0..100 {
            assert!(["a", "b", "c"].contains(&dist.sample(&mut rng).unwrap()));
        }
    }

    #[test]
    fn empty_uniform_samples_none() {
        let dist: DiscreteUniform<u8> = DiscreteUniform::new(vec![]);
        let mut rng = WorkerRng::from_seed(1);
        assert_eq!(None, dist.sample(&mut rng));
    }
}
