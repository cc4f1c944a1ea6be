//! Sequential Halving / HMCTS: a round-based budget schedule that repeatedly
//! halves the surviving action set at a decision node, replacing UCB-style
//! selection with a fixed elimination tournament over the node's children.

use super::uct::UctStat;

/// Per-node round state plus the running value estimate each surviving
/// action accumulates (backed up exactly as plain UCT averages).
#[derive(Debug, Clone, Default)]
pub struct HmctsStat {
    pub value: UctStat,
    /// Action-index set still in contention; `None` until the node's first
    /// selection seeds it with every legal action.
    pub surviving: Option<Vec<usize>>,
    /// Action count the round schedule was computed against, fixed at the
    /// node's first selection.
    pub original_n: usize,
    pub round: u32,
    pub round_budget_used: u32,
}

impl HmctsStat {
    pub fn backup(&mut self, value: f64) {
        self.value.backup(value);
    }
}

/// Splits `total_budget` visits across `ceil(log2(num_actions))` rounds, one
/// round per halving of the action set.
pub fn round_schedule(num_actions: usize, total_budget: u32) -> Vec<u32> {
    if num_actions <= 1 {
        return vec![total_budget.max(1)];
    }
    let num_rounds = (num_actions as f64).log2().ceil().max(1.0) as u32;
    let per_round = (total_budget / num_rounds).max(1);
    vec![per_round; num_rounds as usize]
}

/// Keeps the better half of `surviving` (by `values`, indexed by action
/// index), rounding the kept count up so a set of size 1 never empties.
pub fn halve(surviving: &[usize], values: &[f64]) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = surviving.iter().map(|&i| (i, values[i])).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    let keep = ((surviving.len() as f64) / 2.0).ceil() as usize;
    scored.into_iter().take(keep.max(1)).map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_has_one_round_per_halving() {
        let schedule = round_schedule(8, 80);
        assert_eq!(3, schedule.len());
    }

    #[test]
    fn halving_keeps_the_better_scoring_half() {
        let surviving = vec![0, 1, 2, 3];
        let values = vec![1.0, 4.0, 2.0, 3.0];
        let kept = halve(&surviving, &values);
        assert_eq!(vec![1, 3], kept);
    }

    #[test]
    fn halving_a_singleton_keeps_it() {
        assert_eq!(vec![2], halve(&[2], &[0.0, 0.0, 5.0]));
    }
}
