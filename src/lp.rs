//! The small exact linear program behind CHMCTS' strong-domination test
//! (spec "hull pruning"): given a candidate point `p` and the other hull
//! points, decide whether some simplex weight vector makes `p` at least as
//! good as every other point plus a positive margin.
//!
//! No third-party LP crate is pulled in for this: the program has a known,
//! small, fixed shape (one free variable `x`, `dim` simplex weights, one
//! constraint per other point), so a short two-phase simplex over its
//! specific structure is cheaper to own than to integrate a general solver.

use crate::error::{NumericError, ThtsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpOutcome {
    Dominated,
    NotDominated,
}

/// Pluggable strategy for the strong-domination LP, so a caller can swap in
/// a different numeric backend without touching `HullStat`.
pub trait LpSolver: Send + Sync {
    fn solve_strong_domination(&self, candidate: &[f64], others: &[&Vec<f64>]) -> ThtsResult<LpOutcome>;
}

/// The default solver: a dense two-phase simplex specialised to this LP's
/// shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactSimplexLpSolver;

impl LpSolver for ExactSimplexLpSolver {
    fn solve_strong_domination(&self, candidate: &[f64], others: &[&Vec<f64>]) -> ThtsResult<LpOutcome> {
        solve_strong_domination(candidate, others)
    }
}

/// Free-function entry point used directly by [`crate::stats::hull::HullStat`].
///
/// maximise `x`
/// s.t. `w . (p - p') - x >= 0` for every `p'` in `others`
///      `sum(w) = 1`, `w in [0,1]^dim`
///
/// Degenerate base cases (`others` empty, or `others == {p}`) and LP
/// infeasibility both return `NotDominated` immediately, per the recovery
/// policy for this error class; anything else that fails to reach
/// optimality is a [`NumericError::LpNotOptimal`].
pub fn solve_strong_domination(candidate: &[f64], others: &[&Vec<f64>]) -> ThtsResult<LpOutcome> {
    let others: Vec<&Vec<f64>> = others.iter().filter(|o| o.as_slice() != candidate).copied().collect();
    if others.is_empty() {
        return Ok(LpOutcome::NotDominated);
    }

    let dim = candidate.len();
    // Variables: w_0..w_{dim-1}, x. Maximise x subject to, for each other
    // point o: sum_i w_i*(p_i - o_i) - x >= 0, i.e. -sum_i w_i*(p_i-o_i) + x <= 0.
    // Plus sum(w) = 1, w_i >= 0, x free (split into x+ - x-).
    let num_rows = others.len() + 1; // domination rows + the equality row

    // Standard form for our tableau: variables w_i >= 0 (i=0..dim-1), and
    // x represented as x = xp - xn with xp, xn >= 0. Objective: maximise xp - xn.
    let num_cols = dim + 2; // w..., xp, xn
    let mut a = vec![vec![0.0; num_cols]; num_rows];
    let mut b = vec![0.0; num_rows];

    for (row, o) in others.iter().enumerate() {
        for i in 0..dim {
            a[row][i] = -(candidate[i] - o[i]);
        }
        a[row][dim] = 1.0; // xp
        a[row][dim + 1] = -1.0; // xn
        b[row] = 0.0;
    }
    // Equality row: sum(w) = 1, encoded as <= 1 and >= 1 via two-phase feasibility
    // handled by `solve_with_equality`.
    let eq_row = others.len();
    for i in 0..dim {
        a[eq_row][i] = 1.0;
    }
    b[eq_row] = 1.0;

    let mut c = vec![0.0; num_cols];
    c[dim] = 1.0;
    c[dim + 1] = -1.0;

    match two_phase_simplex(&a, &b, &c, others.len()) {
        SimplexResult::Optimal(x_value) => {
            if x_value <= 1e-9 {
                Ok(LpOutcome::Dominated)
            } else {
                Ok(LpOutcome::NotDominated)
            }
        }
        SimplexResult::Infeasible => Ok(LpOutcome::NotDominated),
        SimplexResult::Unbounded | SimplexResult::DidNotConverge => Err(NumericError::LpNotOptimal.into()),
    }
}

enum SimplexResult {
    Optimal(f64),
    Infeasible,
    Unbounded,
    DidNotConverge,
}

/// A compact two-phase simplex: `num_inequality_rows` rows are `<=`
/// constraints with slacks added automatically, followed by one equality row.
/// All variables in `a`'s columns are implicitly `>= 0`.
fn two_phase_simplex(a: &[Vec<f64>], b: &[f64], c: &[f64], num_inequality_rows: usize) -> SimplexResult {
    let num_rows = a.len();
    let num_structural = c.len();
    // slack for each inequality row, artificial for the equality row(s).
    let num_slack = num_inequality_rows;
    let num_artificial = num_rows - num_inequality_rows;
    let total_cols = num_structural + num_slack + num_artificial;

    let mut tableau = vec![vec![0.0; total_cols + 1]; num_rows + 1];
    for r in 0..num_rows {
        for col in 0..num_structural {
            tableau[r][col] = a[r][col];
        }
        if r < num_inequality_rows {
            tableau[r][num_structural + r] = 1.0;
        } else {
            tableau[r][num_structural + num_slack + (r - num_inequality_rows)] = 1.0;
        }
        tableau[r][total_cols] = b[r];
    }

    // Phase 1: minimise the sum of artificial variables.
    let artificial_cols: Vec<usize> = (0..num_artificial).map(|i| num_structural + num_slack + i).collect();
    let mut basis: Vec<usize> = (0..num_rows)
        .map(|r| if r < num_inequality_rows { num_structural + r } else { artificial_cols[r - num_inequality_rows] })
        .collect();

    if num_artificial > 0 {
        let phase1_row = num_rows;
        for col in 0..=total_cols {
            tableau[phase1_row][col] = 0.0;
        }
        for ac_row in num_inequality_rows..num_rows {
            for col in 0..=total_cols {
                tableau[phase1_row][col] -= tableau[ac_row][col];
            }
        }
        if !run_simplex_iterations(&mut tableau, &mut basis, num_rows) {
            return SimplexResult::DidNotConverge;
        }
        if tableau[phase1_row][total_cols].abs() > 1e-6 {
            return SimplexResult::Infeasible;
        }
    }

    // Phase 2: restore the real objective row (maximise -> minimise -c).
    let obj_row = num_rows;
    for col in 0..total_cols {
        tableau[obj_row][col] = if col < num_structural { -c[col] } else { 0.0 };
    }
    tableau[obj_row][total_cols] = 0.0;
    for (r, &bv) in basis.iter().enumerate() {
        let coeff = tableau[obj_row][bv];
        if coeff != 0.0 {
            for col in 0..=total_cols {
                tableau[obj_row][col] -= coeff * tableau[r][col];
            }
        }
    }

    if !run_simplex_iterations(&mut tableau, &mut basis, num_rows) {
        return SimplexResult::DidNotConverge;
    }

    let mut x = vec![0.0; num_structural];
    for (r, &bv) in basis.iter().enumerate() {
        if bv < num_structural {
            x[bv] = tableau[r][total_cols];
        }
    }
    // objective variables are xp (dim) and xn (dim+1) relative to structural cols.
    let xp = x[num_structural - 2];
    let xn = x[num_structural - 1];
    SimplexResult::Optimal(xp - xn)
}

fn run_simplex_iterations(tableau: &mut [Vec<f64>], basis: &mut [usize], num_rows: usize) -> bool {
    let obj_row = num_rows;
    let total_cols = tableau[0].len() - 1;
    for _iteration in 0..500 {
        let mut pivot_col = None;
        let mut best = -1e-9;
        for col in 0..total_cols {
            if tableau[obj_row][col] < best {
                best = tableau[obj_row][col];
                pivot_col = Some(col);
            }
        }
        let Some(pivot_col) = pivot_col else { return true };

        let mut pivot_row = None;
        let mut best_ratio = f64::INFINITY;
        for r in 0..num_rows {
            if tableau[r][pivot_col] > 1e-9 {
                let ratio = tableau[r][total_cols] / tableau[r][pivot_col];
                if ratio < best_ratio {
                    best_ratio = ratio;
                    pivot_row = Some(r);
                }
            }
        }
        let Some(pivot_row) = pivot_row else { return false };

        let pivot_val = tableau[pivot_row][pivot_col];
        for col in 0..=total_cols {
            tableau[pivot_row][col] /= pivot_val;
        }
        for r in 0..=num_rows {
            if r == pivot_row {
                continue;
            }
            let factor = tableau[r][pivot_col];
            if factor != 0.0 {
                for col in 0..=total_cols {
                    tableau[r][col] -= factor * tableau[pivot_row][col];
                }
            }
        }
        basis[pivot_row] = pivot_col;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_other_points_is_not_dominated() {
        let outcome = solve_strong_domination(&[1.0, 2.0], &[]).unwrap();
        assert_eq!(LpOutcome::NotDominated, outcome);
    }

    #[test]
    fn strictly_worse_point_on_every_objective_is_dominated() {
        let worse = vec![0.0, 0.0];
        let outcome = solve_strong_domination(&[1.0, 1.0], &[&worse]).unwrap();
        assert_eq!(LpOutcome::Dominated, outcome);
    }

    #[test]
    fn pareto_incomparable_points_are_not_dominated() {
        let other = vec![0.0, 2.0];
        let outcome = solve_strong_domination(&[2.0, 0.0], &[&other]).unwrap();
        assert_eq!(LpOutcome::NotDominated, outcome);
    }
}
