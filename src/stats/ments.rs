//! MENTS and its variants (DENTS, RENTS, TENTS, DB-MENTS): maximum-entropy
//! search over a soft value computed by log-sum-exp instead of a max.

use crate::distributions::CategoricalDistribution;
use crate::rng::WorkerRng;

const MIN_LOG_WEIGHT: f64 = -30.0;
const MAX_LOG_WEIGHT: f64 = 30.0;
const EPS: f64 = 1e-9;

/// Soft-value statistics for one node, optionally carrying the DP value
/// DB-MENTS recommends by, and the subtree entropy DENTS mixes in.
#[derive(Debug, Clone)]
pub struct MentsStat {
    pub soft_value: f64,
    pub num_backups: u64,
    /// DB-MENTS' conventional DP value, `None` until the first DP backup.
    pub dp_value: Option<f64>,
    pub dp_backups: u64,
    /// DENTS' subtree entropy estimate.
    pub subtree_entropy: f64,
}

impl Default for MentsStat {
    fn default() -> Self {
        MentsStat {
            soft_value: 0.0,
            num_backups: 0,
            dp_value: None,
            dp_backups: 0,
            subtree_entropy: 0.0,
        }
    }
}

impl MentsStat {
    /// C-node soft backup: visit-weighted running mean over the soft values
    /// observed for this action.
    pub fn backup_soft(&mut self, observed: f64) {
        self.num_backups += 1;
        self.soft_value += (observed - self.soft_value) / self.num_backups as f64;
    }

    /// D-node soft backup: `opp_coeff * temp * (logsumexp(opp_coeff * Q / temp) )`.
    /// `child_pseudo_qs` are the current pseudo-Q values of every legal child.
    pub fn backup_soft_d(&mut self, child_pseudo_qs: &[f64], temp: f64, opp_coeff: f64) {
        self.num_backups += 1;
        self.soft_value = log_sum_exp_value(child_pseudo_qs, temp, opp_coeff);
    }

    pub fn backup_dp(&mut self, value: f64) {
        self.dp_backups += 1;
        self.dp_value = Some(self.dp_value.map_or(value, |v| v + (value - v) / self.dp_backups as f64));
    }
}

/// `opp_coeff * temp * logsumexp(opp_coeff * q / temp)`, numerically
/// stabilised by subtracting the running max before exponentiating.
pub fn log_sum_exp_value(qs: &[f64], temp: f64, opp_coeff: f64) -> f64 {
    if qs.is_empty() {
        return 0.0;
    }
    let scaled: Vec<f64> = qs.iter().map(|q| opp_coeff * q / temp).collect();
    let m = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = scaled.iter().map(|s| (s - m).exp()).sum();
    opp_coeff * temp * (sum.ln() + m)
}

/// Local policy entropy `-sum(pi * log(pi))` given already-normalised
/// probabilities.
pub fn local_entropy(policy: &[f64]) -> f64 {
    policy
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum()
}

/// One legal child's pseudo-Q inputs for selection: its current soft value
/// if the child exists, else a prior-derived or default fallback.
pub struct MentsChildView {
    pub pseudo_q: f64,
    pub prior_weight: Option<f64>,
}

/// Builds a child's pseudo-Q per the MENTS per-child rule, from a
/// possibly-missing child soft value and an optional prior weight.
pub fn pseudo_q(existing_soft_value: Option<f64>, prior_weight: Option<f64>, default_q: f64, opp_coeff: f64) -> f64 {
    let raw = match (existing_soft_value, prior_weight) {
        (Some(v), _) => v,
        (None, Some(p)) => (p.max(1e-300).ln()).clamp(MIN_LOG_WEIGHT, MAX_LOG_WEIGHT),
        (None, None) => default_q,
    };
    opp_coeff * raw
}

/// Computes the MENTS selection policy over pseudo-Qs, mixed with a uniform
/// policy at weight `lambda` and, if `prior` is given, with the prior at
/// weight `lambda_tilde`.
pub fn selection_policy(pseudo_qs: &[f64], temp: f64, lambda: f64, prior: Option<(&[f64], f64)>) -> Vec<f64> {
    let n = pseudo_qs.len();
    if n == 0 {
        return Vec::new();
    }
    let scaled: Vec<f64> = pseudo_qs.iter().map(|q| q / temp).collect();
    let m = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp_w: Vec<f64> = scaled.iter().map(|s| (s - m).exp()).collect();
    let total: f64 = exp_w.iter().sum();
    let boltzmann: Vec<f64> = exp_w.iter().map(|w| w / total.max(EPS)).collect();

    let uniform = 1.0 / n as f64;
    let mut policy: Vec<f64> = boltzmann.iter().map(|b| (1.0 - lambda) * b + lambda * uniform).collect();

    if let Some((prior_weights, lambda_tilde)) = prior {
        let prior_total: f64 = prior_weights.iter().sum::<f64>().max(EPS);
        for (p, pw) in policy.iter_mut().zip(prior_weights.iter()) {
            *p = (1.0 - lambda_tilde) * *p + lambda_tilde * (pw / prior_total);
        }
    }

    let sum: f64 = policy.iter().sum();
    if sum > EPS {
        policy.iter_mut().for_each(|p| *p /= sum);
    } else {
        policy.iter_mut().for_each(|p| *p = uniform);
    }
    policy
}

/// Samples an action index from a MENTS selection policy, eliding near-zero
/// components before building the categorical.
pub fn sample_policy(policy: &[f64], rng: &mut WorkerRng) -> usize {
    let weights: fxhash::FxHashMap<usize, f64> = policy
        .iter()
        .enumerate()
        .filter(|(_, &p)| p > EPS)
        .map(|(i, &p)| (i, p))
        .collect();
    if weights.is_empty() {
        return rng.get_rand_int(0, policy.len());
    }
    let dist = CategoricalDistribution::new(weights, 1);
    dist.sample(rng).unwrap_or(0)
}

/// The temperature schedule shared by `temp` and `value_temp`: decays
/// `init` toward `min_temp` as `init / (1 + visits / visits_scale)`.
pub fn decayed_temp(
    decay: crate::config::TempDecay,
    init: f64,
    min_temp: f64,
    visits: u64,
    visits_scale: f64,
    root_visits_scale: f64,
    is_root: bool,
) -> f64 {
    match decay {
        crate::config::TempDecay::None => init,
        crate::config::TempDecay::InverseVisits => (init / (1.0 + visits as f64 / visits_scale)).max(min_temp),
        crate::config::TempDecay::InverseVisitsRootScaled => {
            let scale = if is_root { root_visits_scale } else { visits_scale };
            (init / (1.0 + visits as f64 / scale)).max(min_temp)
        }
    }
}

/// TENTS: the sparsemax value and policy over `qs / temp`.
///
/// Picks the sparse support set `S` by sorting `q` descending and including
/// entries while `1 + (|S|+1)*q > sum(S)`, then returns `(value, policy)`.
pub fn sparsemax(qs: &[f64], temp: f64) -> (f64, Vec<f64>) {
    let n = qs.len();
    if n == 0 {
        return (0.0, Vec::new());
    }
    let scaled: Vec<f64> = qs.iter().map(|q| q / temp).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scaled[b].partial_cmp(&scaled[a]).unwrap());

    let mut running_sum = 0.0;
    let mut support_size = 0usize;
    for (k, &idx) in order.iter().enumerate() {
        let candidate_sum = running_sum + scaled[idx];
        if 1.0 + (k as f64 + 1.0) * scaled[idx] > candidate_sum {
            running_sum = candidate_sum;
            support_size = k + 1;
        } else {
            break;
        }
    }
    if support_size == 0 {
        support_size = 1;
        running_sum = scaled[order[0]];
    }
    let tau = (running_sum - 1.0) / support_size as f64;

    let mut policy = vec![0.0; n];
    for &idx in order.iter().take(support_size) {
        policy[idx] = (scaled[idx] - tau).max(0.0);
    }

    let sum_sq: f64 = order.iter().take(support_size).map(|&i| scaled[i] * scaled[i]).sum();
    let value = 0.5 + 0.5 * sum_sq - 0.5 * tau * tau * support_size as f64;
    (value, policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sum_exp_matches_naive_computation_for_small_inputs() {
        let qs = [1.0, 2.0, 0.5];
        let temp = 1.0;
        let naive: f64 = qs.iter().map(|q| (q / temp).exp()).sum::<f64>().ln() * temp;
        assert!((naive - log_sum_exp_value(&qs, temp, 1.0)).abs() < 1e-9);
    }

    #[test]
    fn selection_policy_sums_to_one() {
        let policy = selection_policy(&[1.0, 2.0, 3.0], 1.0, 0.1, None);
        let sum: f64 = policy.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sparsemax_policy_sums_within_support_to_plausible_distribution() {
        let (_value, policy) = sparsemax(&[3.0, 1.0, 0.0], 1.0);
        assert!(policy.iter().all(|&p| p >= 0.0));
        assert!(policy.iter().cloned().fold(0.0, f64::max) > 0.0);
    }

    #[test]
    fn decayed_temp_floors_at_min_temp() {
        let t = decayed_temp(crate::config::TempDecay::InverseVisits, 1.0, 0.1, 1_000_000, 1.0, 1.0, false);
        assert!(t >= 0.1);
    }
}
