//! CHMCTS' convex hull: a finite set of tagged points in objective space,
//! pruned by a strong-domination test so only the Pareto-useful vertices of
//! the achievable-return set survive.

use crate::error::ThtsResult;
use crate::lp::{solve_strong_domination, LpOutcome};

/// One point on a hull: a return vector and the action/tag it is reachable
/// through, carried so `recommend` can report which action produced it.
#[derive(Debug, Clone)]
pub struct HullPoint<T> {
    pub value: Vec<f64>,
    pub tag: T,
}

#[derive(Debug, Clone, Default)]
pub struct HullStat {
    points: Vec<HullPoint<usize>>,
}

impl HullStat {
    pub fn points(&self) -> &[HullPoint<usize>] {
        &self.points
    }

    /// Minkowski-sums `addend` onto every existing point (or seeds the hull
    /// if empty), then prunes strongly-dominated points.
    pub fn add_and_prune(&mut self, addend: &[(Vec<f64>, usize)]) -> ThtsResult<()> {
        if self.points.is_empty() {
            self.points = addend.iter().map(|(v, t)| HullPoint { value: v.clone(), tag: *t }).collect();
        } else {
            let mut summed = Vec::with_capacity(self.points.len() * addend.len());
            for p in &self.points {
                for (v, t) in addend {
                    let value: Vec<f64> = p.value.iter().zip(v.iter()).map(|(a, b)| a + b).collect();
                    summed.push(HullPoint { value, tag: *t });
                }
            }
            self.points = summed;
        }
        self.prune()
    }

    /// Unions `addend` into the hull without Minkowski-summing: this is the
    /// D-node composition rule ("D-node hull = union of child C-node
    /// hulls"), as opposed to the C-node's `add_and_prune`, which sums a
    /// reward onto every existing point.
    pub fn union_and_prune(&mut self, addend: &[(Vec<f64>, usize)]) -> ThtsResult<()> {
        self.points.extend(addend.iter().map(|(v, t)| HullPoint { value: v.clone(), tag: *t }));
        self.prune()
    }

    fn prune(&mut self) -> ThtsResult<()> {
        let values: Vec<Vec<f64>> = self.points.iter().map(|p| p.value.clone()).collect();
        let mut kept = Vec::new();
        for (i, p) in self.points.iter().enumerate() {
            let others: Vec<&Vec<f64>> = values.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, v)| v).collect();
            match solve_strong_domination(&p.value, &others)? {
                LpOutcome::Dominated => {}
                LpOutcome::NotDominated => kept.push(p.clone()),
            }
        }
        self.points = kept;
        Ok(())
    }

    /// Picks the hull point maximising `weight . value`, breaking ties by
    /// the first point found (callers needing randomness should shuffle the
    /// tied indices themselves via the worker RNG).
    pub fn recommend(&self, weight: &[f64]) -> Option<&HullPoint<usize>> {
        self.points
            .iter()
            .map(|p| (p, p.value.iter().zip(weight.iter()).map(|(a, b)| a * b).sum::<f64>()))
            .fold(None, |best: Option<(&HullPoint<usize>, f64)>, (p, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((p, score)),
            })
            .map(|(p, _)| p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominated_point_is_pruned() {
        let mut hull = HullStat::default();
        hull.add_and_prune(&[(vec![1.0, 1.0], 0), (vec![0.0, 0.0], 1)]).unwrap();
        assert_eq!(1, hull.points().len());
        assert_eq!(vec![1.0, 1.0], hull.points()[0].value);
    }

    #[test]
    fn non_dominated_points_on_the_pareto_front_both_survive() {
        let mut hull = HullStat::default();
        hull.add_and_prune(&[(vec![1.0, 0.0], 0), (vec![0.0, 1.0], 1)]).unwrap();
        assert_eq!(2, hull.points().len());
    }

    #[test]
    fn union_keeps_points_from_distinct_actions_without_summing() {
        let mut hull = HullStat::default();
        hull.union_and_prune(&[(vec![1.0, 0.0], 0)]).unwrap();
        hull.union_and_prune(&[(vec![0.0, 1.0], 1)]).unwrap();
        assert_eq!(2, hull.points().len());
        assert!(hull.points().iter().any(|p| p.tag == 0));
        assert!(hull.points().iter().any(|p| p.tag == 1));
    }

    #[test]
    fn recommend_picks_the_point_maximising_the_weighted_score() {
        let mut hull = HullStat::default();
        hull.add_and_prune(&[(vec![1.0, 0.0], 0), (vec![0.0, 1.0], 1)]).unwrap();
        let picked = hull.recommend(&[0.1, 0.9]).unwrap();
        assert_eq!(1, picked.tag);
    }
}
