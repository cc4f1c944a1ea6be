//! UCT: running-average Q-values with a UCB1 selection rule, optionally
//! widened by a supplied action prior or switched to DP-style max backups.

use crate::config::ThtsManagerConfig;
use crate::rng::WorkerRng;

/// Floor for the adaptive exploration bias, so a node whose children all
/// have `q == 0` (e.g. before any backup) still explores.
const AUTO_BIAS_MIN_BIAS: f64 = 1e-2;

/// Running statistics for one node under UCT. D-nodes store `q` as the
/// running-average value of the node itself (used by the parent's
/// selection); C-nodes store `q` as the running-average return of the
/// action the C-node represents.
#[derive(Debug, Clone, Default)]
pub struct UctStat {
    pub q: f64,
    pub n: u64,
}

impl UctStat {
    /// Running-average update: `q <- q + (value - q) / (n + 1)`.
    pub fn backup(&mut self, value: f64) {
        self.n += 1;
        self.q += (value - self.q) / self.n as f64;
    }

    /// DP-style backup used when `mcts_mode` is set: `q` tracks the best
    /// observed child value rather than an average.
    pub fn backup_dp(&mut self, value: f64) {
        self.n += 1;
        self.q = self.q.max(value);
    }
}

/// One legal action's selection inputs: whether its child already exists,
/// and if so its current `UctStat` and visit count, plus an optional prior
/// weight and the number of trials currently in flight through its C-node.
pub struct UctChildView<'a> {
    pub existing: Option<&'a UctStat>,
    pub prior_weight: Option<f64>,
    pub virtual_losses: i64,
}

/// Picks the index into `children` UCT would select from. Unvisited
/// children without a prior are always preferred (first-play urgency); with
/// a prior, they fall back to `default_q_value` and compete on the usual
/// UCB1 term. Ties are broken uniformly at random.
pub fn select_child(
    children: &[UctChildView<'_>],
    parent_visits: u64,
    config: &ThtsManagerConfig,
    rng: &mut WorkerRng,
) -> usize {
    assert!(!children.is_empty(), "select_child requires at least one legal action");

    let has_priors = children.iter().any(|c| c.prior_weight.is_some());
    if !has_priors {
        if let Some(unvisited) = children.iter().position(|c| c.existing.is_none()) {
            return unvisited;
        }
    }

    if rng.get_rand_bool(config.epsilon.min(config.max_explore_prob)) {
        return rng.get_rand_int(0, children.len());
    }

    let bias = if config.adaptive_cpuct_bias {
        children
            .iter()
            .filter_map(|c| c.existing.map(|s| s.q.abs()))
            .fold(0.0, f64::max)
            .max(AUTO_BIAS_MIN_BIAS)
    } else {
        config.cpuct_exploration
    };
    let log_n = ((parent_visits.max(1)) as f64).ln();

    let mut best_indices = Vec::new();
    let mut best_value = f64::NEG_INFINITY;
    for (i, c) in children.iter().enumerate() {
        let (q, n) = match c.existing {
            Some(s) => (s.q, s.n),
            None => (config.default_q_value, 0),
        };
        let q = if c.virtual_losses > 0 {
            let vl = config.vl_weight;
            q + (config.virtual_loss_utility - q) * vl / (vl + (n as f64).max(0.25))
        } else {
            q
        };
        let explore = bias * (log_n / (n as f64 + 1.0)).sqrt();
        let explore = match c.prior_weight {
            Some(w) => explore * w,
            None => explore,
        };
        let value = q + explore;
        if value > best_value {
            best_value = value;
            best_indices.clear();
            best_indices.push(i);
        } else if value == best_value {
            best_indices.push(i);
        }
    }
    best_indices[rng.get_rand_int(0, best_indices.len())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThtsManagerConfigBuilder;

    #[test]
    fn unvisited_children_are_preferred_first() {
        let config = ThtsManagerConfigBuilder::default().build().unwrap();
        let mut rng = WorkerRng::from_seed(1);
        let children = vec![
            UctChildView { existing: Some(&UctStat { q: 100.0, n: 50 }), prior_weight: None, virtual_losses: 0 },
            UctChildView { existing: None, prior_weight: None, virtual_losses: 0 },
        ];
        assert_eq!(1, select_child(&children, 50, &config, &mut rng));
    }

    #[test]
    fn backup_converges_to_constant_reward() {
        let mut stat = UctStat::default();
        for _ in 0..200 {
            stat.backup(3.0);
        }
        assert!((stat.q - 3.0).abs() < 1e-9);
    }

    #[test]
    fn in_flight_virtual_loss_steers_away_from_the_busy_child() {
        let config = ThtsManagerConfigBuilder::default()
            .epsilon(0.0)
            .cpuct_exploration(0.0)
            .build()
            .unwrap();
        let mut rng = WorkerRng::from_seed(1);
        let a = UctStat { q: 5.0, n: 20 };
        let b = UctStat { q: 5.0, n: 20 };
        let children = vec![
            UctChildView { existing: Some(&a), prior_weight: None, virtual_losses: 1 },
            UctChildView { existing: Some(&b), prior_weight: None, virtual_losses: 0 },
        ];
        assert_eq!(1, select_child(&children, 40, &config, &mut rng));
    }

    #[test]
    fn adaptive_bias_scales_with_the_largest_child_magnitude() {
        let config = ThtsManagerConfigBuilder::default().adaptive_cpuct_bias(true).epsilon(0.0).build().unwrap();
        let mut rng = WorkerRng::from_seed(1);
        let a = UctStat { q: 100.0, n: 10 };
        let b = UctStat { q: 0.0, n: 10 };
        let children = vec![
            UctChildView { existing: Some(&a), prior_weight: None, virtual_losses: 0 },
            UctChildView { existing: Some(&b), prior_weight: None, virtual_losses: 0 },
        ];
        // With a large adaptive bias, the unvisited-in-practice-tied exploration
        // term swamps the q gap and both children draw comparable value; this
        // mainly checks the call doesn't panic and returns a valid index.
        let picked = select_child(&children, 20, &config, &mut rng);
        assert!(picked == 0 || picked == 1);
    }

    #[test]
    fn dp_backup_tracks_the_max() {
        let mut stat = UctStat::default();
        stat.backup_dp(1.0);
        stat.backup_dp(5.0);
        stat.backup_dp(2.0);
        assert_eq!(5.0, stat.q);
    }
}
