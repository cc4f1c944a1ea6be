//! CZT's ball list: a covering of the reward-weight simplex by closed balls
//! of dyadically shrinking radius, refined where trials actually land.

use crate::error::{InternalInvariantError, ThtsResult};

/// A closed ball `{w : ||w - center||_2 <= radius}` over the simplex,
/// carrying a running-average return vector for weights that fall in it.
#[derive(Debug, Clone)]
pub struct Ball {
    pub center: Vec<f64>,
    pub radius: f64,
    pub avg_return: Vec<f64>,
    pub backups: u64,
}

impl Ball {
    pub fn new(center: Vec<f64>, radius: f64, dim: usize) -> Self {
        Ball { center, radius, avg_return: vec![0.0; dim], backups: 0 }
    }

    pub fn contains(&self, w: &[f64]) -> bool {
        euclidean_distance(w, &self.center) <= self.radius
    }

    pub fn confidence_radius(&self, total_backups: u64) -> f64 {
        ((total_backups as f64 + std::f64::consts::E).ln()) / (1.0 + self.backups as f64)
    }

    pub fn update_return(&mut self, trial_return: &[f64]) {
        self.backups += 1;
        for (avg, r) in self.avg_return.iter_mut().zip(trial_return.iter()) {
            *avg += (r - *avg) / self.backups as f64;
        }
    }
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

/// The per-chance-node collection of balls, grouped implicitly by radius
/// (smaller balls always take precedence for a given weight).
#[derive(Debug, Clone)]
pub struct BallListStat {
    balls: Vec<Ball>,
    total_backups: u64,
}

impl BallListStat {
    /// Seeds the list with a single centroid ball covering the whole
    /// `(dim-1)`-simplex (radius `1.0` is large enough in L2 to cover it).
    pub fn new(dim: usize) -> Self {
        let centroid = vec![1.0 / dim as f64; dim];
        BallListStat { balls: vec![Ball::new(centroid, 1.0, dim)], total_backups: 0 }
    }

    /// Balls whose domain contains `w`, ordered from smallest to largest
    /// radius (index 0 is the most relevant).
    pub fn relevant_balls(&self, w: &[f64]) -> Vec<usize> {
        let mut hits: Vec<usize> = self.balls.iter().enumerate().filter(|(_, b)| b.contains(w)).map(|(i, _)| i).collect();
        hits.sort_by(|&a, &b| self.balls[a].radius.partial_cmp(&self.balls[b].radius).unwrap());
        hits
    }

    pub fn balls(&self) -> &[Ball] {
        &self.balls
    }

    /// Applies a ball-list backup to the ball chosen at selection time, then
    /// checks whether it has earned a split. `w` is the trial's sampled
    /// weight: a newly activated ball is centered there, not on the parent
    /// ball's own center, so repeated splits actually refine coverage around
    /// where trials land instead of all nesting around the original centroid.
    pub fn backup(&mut self, chosen_ball: usize, trial_return: &[f64], w: &[f64], split_threshold: u64) {
        self.total_backups += 1;
        self.balls[chosen_ball].update_return(trial_return);
        self.maybe_split(chosen_ball, w, split_threshold);
    }

    fn maybe_split(&mut self, ball_idx: usize, w: &[f64], split_threshold: u64) {
        let ball = &self.balls[ball_idx];
        if ball.backups < split_threshold {
            return;
        }
        if ball.confidence_radius(self.total_backups) > ball.radius {
            return;
        }
        let new_radius = ball.radius / 2.0;
        let dim = w.len();
        self.balls.push(Ball::new(w.to_vec(), new_radius, dim));
    }

    /// The index, per CZT's selection rule: the maximum over relevant balls
    /// of `pre_index + distance to any larger ball's center`, where
    /// `pre_index = opp_coeff * weight.avg_return + 2*radius + bias*confidence_radius`.
    ///
    /// Every legal weight lies in the seed ball's domain (radius `1.0`
    /// covers the whole simplex), so an empty `relevant_balls(w)` means the
    /// list's invariant - "some ball always covers every weight" - has been
    /// broken, e.g. by a split that left a gap. That is fatal, not a
    /// "nothing found yet" case, so it is raised rather than papered over
    /// with a sentinel score.
    pub fn index_for(&self, w: &[f64], opp_coeff: f64, bias: f64) -> ThtsResult<f64> {
        let relevant = self.relevant_balls(w);
        if relevant.is_empty() {
            return Err(InternalInvariantError::NoRelevantBall.into());
        }
        Ok(relevant
            .iter()
            .map(|&i| {
                let ball = &self.balls[i];
                let weighted_return: f64 = w.iter().zip(ball.avg_return.iter()).map(|(a, b)| a * b).sum();
                let pre_index = opp_coeff * weighted_return + 2.0 * ball.radius + bias * ball.confidence_radius(self.total_backups);
                let widen = self
                    .balls
                    .iter()
                    .filter(|b| b.radius > ball.radius)
                    .map(|b| euclidean_distance(&ball.center, &b.center))
                    .fold(0.0, f64::max);
                pre_index + widen
            })
            .fold(f64::NEG_INFINITY, f64::max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_list_has_one_ball_covering_everything() {
        let list = BallListStat::new(3);
        assert_eq!(1, list.balls().len());
        assert_eq!(vec![0], list.relevant_balls(&[0.2, 0.3, 0.5]));
    }

    #[test]
    fn enough_backups_splits_the_ball() {
        let mut list = BallListStat::new(2);
        for _ in 0..20 {
            list.backup(0, &[1.0, 0.0], &[0.9, 0.1], 2);
        }
        assert!(list.balls().len() > 1, "expected a split after repeated backups");
    }

    #[test]
    fn split_ball_is_centered_on_the_trial_weight_not_the_parent_center() {
        let mut list = BallListStat::new(2);
        let w = [0.9, 0.1];
        for _ in 0..5 {
            list.backup(0, &[1.0, 0.0], &w, 2);
        }
        assert_eq!(w.to_vec(), list.balls()[1].center);
    }

    #[test]
    fn index_prefers_the_ball_with_higher_weighted_return() {
        let mut list = BallListStat::new(2);
        list.backup(0, &[10.0, 10.0], &[0.5, 0.5], 100);
        let idx = list.index_for(&[0.5, 0.5], 1.0, 0.0).unwrap();
        assert!(idx > 0.0);
    }

    #[test]
    fn index_for_a_weight_outside_the_whole_list_is_a_fatal_invariant_error() {
        let list = BallListStat { balls: vec![Ball::new(vec![0.5, 0.5], 0.1, 2)], total_backups: 0 };
        assert!(list.index_for(&[0.0, 1.0], 1.0, 0.0).is_err());
    }
}
