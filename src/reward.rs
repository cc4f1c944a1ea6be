//! Scalar or vector rewards, unified behind one small value type so the tree
//! and trial engine never need to know which kind of objective they carry.

use std::ops::{Add, AddAssign, Mul};

/// A reward (or a return, or a value estimate) that is either a single scalar
/// or a vector indexed by objective.
#[derive(Debug, Clone, PartialEq)]
pub enum Reward {
    Scalar(f64),
    Vector(Vec<f64>),
}

impl Reward {
    pub fn zero_scalar() -> Self {
        Reward::Scalar(0.0)
    }

    pub fn zero_vector(dim: usize) -> Self {
        Reward::Vector(vec![0.0; dim])
    }

    pub fn dim(&self) -> usize {
        match self {
            Reward::Scalar(_) => 1,
            Reward::Vector(v) => v.len(),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, Reward::Vector(_))
    }

    /// Linear scalarisation under a per-trial context weight. For a scalar
    /// reward the weight is ignored (there is exactly one objective).
    pub fn scalarize(&self, weight: Option<&[f64]>) -> f64 {
        match self {
            Reward::Scalar(v) => *v,
            Reward::Vector(v) => {
                let w = weight.expect("vector reward requires a context weight to scalarize");
                debug_assert_eq!(w.len(), v.len());
                v.iter().zip(w.iter()).map(|(a, b)| a * b).sum()
            }
        }
    }

    pub fn scale(&self, factor: f64) -> Reward {
        match self {
            Reward::Scalar(v) => Reward::Scalar(v * factor),
            Reward::Vector(v) => Reward::Vector(v.iter().map(|x| x * factor).collect()),
        }
    }

    /// In-place running-mean update: `self <- self + (new - self) / n`.
    pub fn running_mean_update(&mut self, new: &Reward, n: f64) {
        match (self, new) {
            (Reward::Scalar(s), Reward::Scalar(v)) => *s += (*v - *s) / n,
            (Reward::Vector(s), Reward::Vector(v)) => {
                for (si, vi) in s.iter_mut().zip(v.iter()) {
                    *si += (*vi - *si) / n;
                }
            }
            _ => panic!("mismatched reward kinds in running_mean_update"),
        }
    }
}

impl Add for Reward {
    type Output = Reward;
    fn add(self, rhs: Reward) -> Reward {
        match (self, rhs) {
            (Reward::Scalar(a), Reward::Scalar(b)) => Reward::Scalar(a + b),
            (Reward::Vector(a), Reward::Vector(b)) => {
                Reward::Vector(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
            }
            _ => panic!("mismatched reward kinds in Add"),
        }
    }
}

impl AddAssign<&Reward> for Reward {
    fn add_assign(&mut self, rhs: &Reward) {
        match (self, rhs) {
            (Reward::Scalar(a), Reward::Scalar(b)) => *a += b,
            (Reward::Vector(a), Reward::Vector(b)) => {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
            }
            _ => panic!("mismatched reward kinds in AddAssign"),
        }
    }
}

impl Mul<f64> for &Reward {
    type Output = Reward;
    fn mul(self, rhs: f64) -> Reward {
        self.scale(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalarize_scalar_ignores_weight() {
        let r = Reward::Scalar(3.0);
        assert_eq!(3.0, r.scalarize(None));
    }

    #[test]
    fn scalarize_vector_dots_with_weight() {
        let r = Reward::Vector(vec![1.0, 2.0, 3.0]);
        let w = vec![0.2, 0.3, 0.5];
        assert!((r.scalarize(Some(&w)) - (0.2 + 0.6 + 1.5)).abs() < 1e-9);
    }

    #[test]
    fn running_mean_converges_to_constant_input() {
        let mut mean = Reward::Scalar(0.0);
        for n in 1..=100 {
            mean.running_mean_update(&Reward::Scalar(5.0), n as f64);
        }
        assert!((5.0 - match mean {
            Reward::Scalar(v) => v,
            _ => unreachable!(),
        })
        .abs()
            < 1e-9);
    }
}
