//! SMBTS/SMDENTS' simplex map: a binary (or precomputed-triangulation)
//! subdivision of the weight simplex, overlaid with a neighbourhood graph of
//! value estimates that message-passing relaxes toward a piecewise-linear
//! envelope.

use fxhash::FxHashMap;
use petgraph::graphmap::UnGraphMap;

use crate::config::SimplexSplittingOption;
use crate::error::{InternalInvariantError, ThtsResult};
use crate::rng::WorkerRng;

/// A vertex of the neighbourhood graph: hashed by its (quantised) weight, so
/// duplicate vertices created by independent subdivisions coalesce.
#[derive(Debug, Clone)]
pub struct Ngv {
    pub weight: Vec<OrderedF64>,
    pub value: Vec<f64>,
    pub entropy: f64,
}

/// A thin newtype giving `f64` the `Eq`/`Hash` a weight vector needs to key
/// the NGV coalescing set; weights are always finite simplex coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderedF64(pub f64);

impl Eq for OrderedF64 {}
impl std::hash::Hash for OrderedF64 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

fn quantise(w: &[f64]) -> Vec<OrderedF64> {
    w.iter().map(|x| OrderedF64((x * 1e9).round() / 1e9)).collect()
}

/// One leaf tree node: the `dim` NGV indices bounding its simplex, its
/// centroid, its l-infinity diameter and split counter.
#[derive(Debug, Clone)]
pub struct LeafTn {
    pub vertex_ids: Vec<usize>,
    pub centroid: Vec<f64>,
    pub l_inf_diameter: f64,
    pub depth: u32,
    pub split_counter: u32,
}

impl LeafTn {
    /// `w` lies in this simplex iff its barycentric coordinates with respect
    /// to `vertices` (the leaf's own corner weights) are all non-negative:
    /// the true halfplane/opposing-face test, not a ball-around-the-centroid
    /// proxy. Returns `None` if `vertices` are affinely degenerate (the
    /// barycentric system is singular).
    fn contains(&self, vertices: &[Vec<f64>], w: &[f64]) -> Option<bool> {
        barycentric_coords(vertices, w).map(|lambda| lambda.iter().all(|&l| l >= -1e-7))
    }
}

/// Solves for the barycentric coordinates of `w` with respect to the
/// `dim` affinely-independent vertices in `vertices` (each summing to 1,
/// like `w` itself): the unique `lambda` with `sum(lambda) == 1` and
/// `sum(lambda_i * vertices[i]) == w`.
///
/// The `dim` vertex-coordinate equations are rank-deficient by exactly one
/// (every column already sums to 1, so the rows are linearly dependent);
/// the redundant last equation is dropped and replaced with the
/// `sum(lambda) == 1` constraint to get a square, generically solvable
/// system, solved by Gaussian elimination with partial pivoting.
fn barycentric_coords(vertices: &[Vec<f64>], w: &[f64]) -> Option<Vec<f64>> {
    let n = vertices.len();
    let dim = w.len();
    if n != dim {
        return None;
    }
    let mut a = vec![vec![0.0; n + 1]; dim];
    for row in a.iter_mut().take(dim.saturating_sub(1)) {
        row[n] = 0.0;
    }
    for r in 0..dim.saturating_sub(1) {
        for (c, v) in vertices.iter().enumerate() {
            a[r][c] = v[r];
        }
        a[r][n] = w[r];
    }
    let last = dim - 1;
    for c in 0..n {
        a[last][c] = 1.0;
    }
    a[last][n] = 1.0;
    gaussian_solve(a)
}

/// Gaussian elimination with partial pivoting on the augmented matrix `a`
/// (`n` unknowns, `n` rows, `n+1` columns). Returns `None` on a singular
/// (or near-singular) system.
fn gaussian_solve(mut a: Vec<Vec<f64>>) -> Option<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| a[r1][col].abs().partial_cmp(&a[r2][col].abs()).unwrap())?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        for r in (col + 1)..n {
            let factor = a[r][col] / a[col][col];
            if factor != 0.0 {
                for c in col..=n {
                    a[r][c] -= factor * a[col][c];
                }
            }
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut rhs = a[row][n];
        for c in (row + 1)..n {
            rhs -= a[row][c] * x[c];
        }
        x[row] = rhs / a[row][row];
    }
    Some(x)
}

#[derive(Debug, Clone)]
pub struct SimplexStat {
    ngvs: Vec<Ngv>,
    coalesce: FxHashMap<Vec<OrderedF64>, usize>,
    graph: UnGraphMap<usize, ()>,
    leaves: Vec<LeafTn>,
    splitting_option: SimplexSplittingOption,
    l_inf_thresh: f64,
    split_visit_thresh: u32,
    max_depth: u32,
}

impl SimplexStat {
    pub fn new(dim: usize, splitting_option: SimplexSplittingOption, l_inf_thresh: f64, split_visit_thresh: u32, max_depth: u32) -> Self {
        let uniform = vec![1.0 / dim as f64; dim];
        let mut stat = SimplexStat {
            ngvs: Vec::new(),
            coalesce: FxHashMap::default(),
            graph: UnGraphMap::new(),
            leaves: Vec::new(),
            splitting_option,
            l_inf_thresh,
            split_visit_thresh,
            max_depth,
        };

        let vertex_ids: Vec<usize> = (0..dim)
            .map(|i| {
                let mut w = vec![0.0; dim];
                w[i] = 1.0;
                stat.intern_ngv(w)
            })
            .collect();
        stat.connect_all(&vertex_ids);

        stat.leaves.push(LeafTn {
            vertex_ids,
            centroid: uniform,
            l_inf_diameter: 1.0,
            depth: 0,
            split_counter: 0,
        });
        stat
    }

    fn intern_ngv(&mut self, weight: Vec<f64>) -> usize {
        let key = quantise(&weight);
        if let Some(&id) = self.coalesce.get(&key) {
            return id;
        }
        let id = self.ngvs.len();
        let dim = weight.len();
        self.ngvs.push(Ngv { weight: key.clone(), value: vec![0.0; dim], entropy: 0.0 });
        self.coalesce.insert(key, id);
        self.graph.add_node(id);
        id
    }

    /// Connects every pair of vertices bounding a single simplex.
    fn connect_all(&mut self, vertex_ids: &[usize]) {
        for i in 0..vertex_ids.len() {
            for j in (i + 1)..vertex_ids.len() {
                self.graph.add_edge(vertex_ids[i], vertex_ids[j], ());
            }
        }
    }

    pub fn ngv(&self, id: usize) -> &Ngv {
        &self.ngvs[id]
    }

    pub fn splitting_option(&self) -> SimplexSplittingOption {
        self.splitting_option
    }

    /// Finds the leaf TN containing `w` by the exact halfplane test and
    /// returns its index. The leaves always tile the unit simplex, so a miss
    /// here (every leaf's barycentric test rejects `w`, or none of them could
    /// even be solved) is a genuine coverage failure, not a "not found yet"
    /// case - it is raised rather than silently falling back to a nearest
    /// leaf, which would mask a real defect in the subdivision.
    pub fn leaf_for(&self, w: &[f64]) -> ThtsResult<usize> {
        for (i, leaf) in self.leaves.iter().enumerate() {
            let vertices: Vec<Vec<f64>> = leaf.vertex_ids.iter().map(|&id| to_f64(&self.ngvs[id].weight)).collect();
            if leaf.contains(&vertices, w) == Some(true) {
                return Ok(i);
            }
        }
        Err(InternalInvariantError::SimplexCoverageCheckFailed.into())
    }

    /// The NGV closest (by weight) to `w` among the leaf's vertices.
    pub fn closest_ngv(&self, leaf_idx: usize, w: &[f64]) -> usize {
        let leaf = &self.leaves[leaf_idx];
        *leaf
            .vertex_ids
            .iter()
            .min_by(|&&a, &&b| {
                l2(w, &to_f64(&self.ngvs[a].weight)).partial_cmp(&l2(w, &to_f64(&self.ngvs[b].weight))).unwrap()
            })
            .expect("a leaf always has at least one vertex")
    }

    /// Stores `(value, entropy)` on the NGV(s) `w`'s leaf updates, runs the
    /// subdivision check, and propagates the update via message passing.
    /// When `update_all_vertices` is set (`backup_all_vertices_of_simplex`),
    /// every vertex bounding the leaf is updated rather than just the one
    /// closest to `w`.
    pub fn backup(&mut self, w: &[f64], value: Vec<f64>, entropy: f64, update_all_vertices: bool, rng: &mut WorkerRng) -> ThtsResult<()> {
        let leaf_idx = self.leaf_for(w)?;
        let touched: Vec<usize> = if update_all_vertices {
            self.leaves[leaf_idx].vertex_ids.clone()
        } else {
            vec![self.closest_ngv(leaf_idx, w)]
        };
        for &ngv_id in &touched {
            self.ngvs[ngv_id].value = value.clone();
            self.ngvs[ngv_id].entropy = entropy;
        }
        self.maybe_subdivide(leaf_idx, rng);
        for ngv_id in touched {
            self.message_pass(ngv_id);
        }
        Ok(())
    }

    fn maybe_subdivide(&mut self, leaf_idx: usize, rng: &mut WorkerRng) {
        let already_split = self.leaves[leaf_idx].depth >= self.max_depth
            || self.leaves[leaf_idx].l_inf_diameter <= self.l_inf_thresh;
        if already_split {
            return;
        }
        let vertex_ids = self.leaves[leaf_idx].vertex_ids.clone();
        let values: Vec<&Vec<f64>> = vertex_ids.iter().map(|&id| &self.ngvs[id].value).collect();
        let differs = values.windows(2).any(|w| w[0] != w[1]);
        if differs {
            self.leaves[leaf_idx].split_counter += 1;
        } else {
            self.leaves[leaf_idx].split_counter = 0;
        }
        if self.leaves[leaf_idx].split_counter >= self.split_visit_thresh {
            self.subdivide(leaf_idx, rng);
        }
    }

    /// Picks the edge to bisect, per `splitting_option`: `Ordered` always
    /// takes the longest edge; `SmallestEdgeRandomly` takes the shortest,
    /// breaking ties uniformly at random; `Random` ignores edge length
    /// entirely; `ValueDiff` takes the edge whose endpoint NGVs currently
    /// disagree the most on their backed-up value. `Triangulation` is
    /// rejected at configuration time and never reaches here.
    fn pick_split_edge(&self, vertex_ids: &[usize], rng: &mut WorkerRng) -> (usize, usize) {
        let n = vertex_ids.len();
        let mut edges: Vec<(usize, usize, f64)> = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                let wi = to_f64(&self.ngvs[vertex_ids[i]].weight);
                let wj = to_f64(&self.ngvs[vertex_ids[j]].weight);
                edges.push((i, j, l_inf(&wi, &wj)));
            }
        }
        match self.splitting_option {
            SimplexSplittingOption::Ordered => edges
                .into_iter()
                .fold((0, 1, f64::NEG_INFINITY), |best, e| if e.2 > best.2 { e } else { best }),
            SimplexSplittingOption::SmallestEdgeRandomly => {
                let min_len = edges.iter().map(|e| e.2).fold(f64::INFINITY, f64::min);
                let candidates: Vec<(usize, usize, f64)> = edges.into_iter().filter(|e| (e.2 - min_len).abs() < 1e-9).collect();
                candidates[rng.get_rand_int(0, candidates.len())]
            }
            SimplexSplittingOption::Random => edges[rng.get_rand_int(0, edges.len())],
            SimplexSplittingOption::ValueDiff => edges
                .into_iter()
                .fold((0, 1, f64::NEG_INFINITY), |best, (i, j, _)| {
                    let diff = l2(&self.ngvs[vertex_ids[i]].value, &self.ngvs[vertex_ids[j]].value);
                    if diff > best.2 {
                        (i, j, diff)
                    } else {
                        best
                    }
                }),
            SimplexSplittingOption::Triangulation => {
                unreachable!("Triangulation is rejected by ThtsManagerConfig::validate before a SimplexStat is built")
            }
        }
    }

    /// Binary subdivision of the leaf along the edge `pick_split_edge` chose.
    fn subdivide(&mut self, leaf_idx: usize, rng: &mut WorkerRng) {
        let leaf = self.leaves[leaf_idx].clone();
        let n = leaf.vertex_ids.len();
        if n < 2 {
            return;
        }
        let (i, j) = self.pick_split_edge(&leaf.vertex_ids, rng);
        let wi = to_f64(&self.ngvs[leaf.vertex_ids[i]].weight);
        let wj = to_f64(&self.ngvs[leaf.vertex_ids[j]].weight);
        let midpoint: Vec<f64> = wi.iter().zip(wj.iter()).map(|(a, b)| (a + b) / 2.0).collect();
        let mid_id = self.intern_ngv(midpoint.clone());

        let shared: Vec<usize> = leaf.vertex_ids.iter().enumerate().filter(|(k, _)| *k != i && *k != j).map(|(_, &v)| v).collect();

        let mut child_a_vertices = shared.clone();
        child_a_vertices.push(mid_id);
        child_a_vertices.push(leaf.vertex_ids[i]);
        let mut child_b_vertices = shared;
        child_b_vertices.push(mid_id);
        child_b_vertices.push(leaf.vertex_ids[j]);

        let centroid_of = |ids: &[usize], ngvs: &[Ngv]| -> Vec<f64> {
            let dim = midpoint.len();
            let mut c = vec![0.0; dim];
            for &id in ids {
                for (k, v) in to_f64(&ngvs[id].weight).iter().enumerate() {
                    c[k] += v / ids.len() as f64;
                }
            }
            c
        };

        let child_a = LeafTn {
            centroid: centroid_of(&child_a_vertices, &self.ngvs),
            vertex_ids: child_a_vertices,
            l_inf_diameter: leaf.l_inf_diameter / 2.0,
            depth: leaf.depth + 1,
            split_counter: 0,
        };
        let child_b = LeafTn {
            centroid: centroid_of(&child_b_vertices, &self.ngvs),
            vertex_ids: child_b_vertices,
            l_inf_diameter: leaf.l_inf_diameter / 2.0,
            depth: leaf.depth + 1,
            split_counter: 0,
        };
        self.connect_all(&child_a.vertex_ids.clone());
        self.connect_all(&child_b.vertex_ids.clone());
        self.leaves[leaf_idx] = child_a;
        self.leaves.push(child_b);
    }

    /// Push/pull a vertex's `(value, entropy)` toward neighbours whose
    /// weighted value it improves on, and symmetrically.
    fn message_pass(&mut self, v: usize) {
        let neighbours: Vec<usize> = self.graph.neighbors(v).collect();
        for u in neighbours {
            let v_weight = to_f64(&self.ngvs[v].weight);
            let v_dot: f64 = v_weight.iter().zip(self.ngvs[v].value.iter()).map(|(a, b)| a * b).sum();
            let u_weight = to_f64(&self.ngvs[u].weight);
            let u_dot_v: f64 = u_weight.iter().zip(self.ngvs[v].value.iter()).map(|(a, b)| a * b).sum();
            let u_dot_u: f64 = u_weight.iter().zip(self.ngvs[u].value.iter()).map(|(a, b)| a * b).sum();
            if u_dot_v > u_dot_u {
                self.ngvs[u].value = self.ngvs[v].value.clone();
                self.ngvs[u].entropy = self.ngvs[v].entropy;
            }
            let _ = v_dot;
        }
    }
}

fn to_f64(w: &[OrderedF64]) -> Vec<f64> {
    w.iter().map(|x| x.0).collect()
}

fn l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

fn l_inf(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_map_has_one_leaf_spanning_the_whole_simplex() {
        let map = SimplexStat::new(3, SimplexSplittingOption::Ordered, 1e-3, 1, 10);
        assert_eq!(1, map.leaves.len());
        assert_eq!(3, map.leaves[0].vertex_ids.len());
    }

    #[test]
    fn d_two_descent_picks_the_single_leaf() {
        let map = SimplexStat::new(2, SimplexSplittingOption::Ordered, 1e-3, 1, 10);
        assert_eq!(0, map.leaf_for(&[0.5, 0.5]).unwrap());
    }

    #[test]
    fn descent_rejects_a_weight_outside_the_simplex() {
        let map = SimplexStat::new(2, SimplexSplittingOption::Ordered, 1e-3, 1, 10);
        assert!(map.leaf_for(&[1.5, -0.5]).is_err());
    }

    #[test]
    fn repeated_divergent_backups_eventually_subdivide() {
        let mut map = SimplexStat::new(2, SimplexSplittingOption::Ordered, 1e-6, 1, 10);
        let mut rng = WorkerRng::from_seed(1);
        map.backup(&[0.9, 0.1], vec![1.0, 0.0], 0.0, false, &mut rng).unwrap();
        map.backup(&[0.1, 0.9], vec![0.0, 1.0], 0.0, false, &mut rng).unwrap();
        assert!(map.leaves.len() >= 2, "expected at least one subdivision");
    }

    #[test]
    fn backup_all_vertices_touches_every_corner_of_the_leaf() {
        let mut map = SimplexStat::new(3, SimplexSplittingOption::Ordered, 1e-6, 1, 10);
        let mut rng = WorkerRng::from_seed(1);
        map.backup(&[0.34, 0.33, 0.33], vec![2.0, 2.0, 2.0], 0.0, true, &mut rng).unwrap();
        assert!(map.ngvs.iter().all(|n| n.value == vec![2.0, 2.0, 2.0]));
    }

    #[test]
    fn smallest_edge_randomly_splits_the_shortest_edge() {
        let mut map = SimplexStat::new(2, SimplexSplittingOption::SmallestEdgeRandomly, 1e-9, 1, 10);
        let mut rng = WorkerRng::from_seed(1);
        map.backup(&[0.9, 0.1], vec![1.0, 0.0], 0.0, false, &mut rng).unwrap();
        map.backup(&[0.1, 0.9], vec![0.0, 1.0], 0.0, false, &mut rng).unwrap();
        assert!(map.leaves.len() >= 2);
    }
}
