//! The trial-pool engine: a worker-per-thread pool repeatedly descends the
//! shared tree, expanding lazily, backing up on the way out, until a
//! [`Cutoff`] says to stop.
//!
//! Grounded on the same worker-pool shape as the parallel MDD solver
//! (`std::thread::scope` plus one shared piece of atomically-guarded state),
//! adapted here so each worker drives an independent trial rather than
//! pulling nodes off one shared fringe.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fxhash::FxHasher;
use parking_lot::Mutex;

use crate::config::ThtsManagerConfig;
use crate::context::TrialContext;
use crate::cutoff::{Cutoff, TrialCounter};
use crate::env::Environment;
use crate::error::{ThtsError, ThtsResult};
use crate::reward::Reward;
use crate::rng::WorkerRng;
use crate::stats::ball::BallListStat;
use crate::stats::hmcts::{self, HmctsStat};
use crate::stats::hull::HullStat;
use crate::stats::ments::{self, MentsStat};
use crate::stats::simplex::SimplexStat;
use crate::stats::uct::{self, UctChildView, UctStat};
use crate::stats::Stat;
use crate::tree::{CNode, DNode, TranspositionTable};

/// Which family of node statistics a manager searches with. Fixes both how
/// fresh nodes are seeded and how selection/backup are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatFamily {
    Uct,
    Ments,
    Ball,
    Hull,
    Simplex,
    /// Sequential Halving / HMCTS: round-based budget partitioning over the
    /// legal action set instead of a UCB or soft-value selection rule.
    Hmcts,
}

impl StatFamily {
    /// Builds the fresh `Stat` for a node just created during this trial.
    /// `heuristic` seeds the scalar families' running value with
    /// `config.heuristic_pseudo_trials` pseudo-observations when a heuristic
    /// was evaluated for the node (D-nodes only; C-nodes pass `None`).
    fn fresh_stat(&self, dim: usize, config: &ThtsManagerConfig, heuristic: Option<&Reward>) -> Stat {
        let pseudo_trials = config.heuristic_pseudo_trials as u64;
        let seed = heuristic.filter(|_| pseudo_trials > 0 && dim <= 1).map(|h| h.scalarize(None));
        match self {
            StatFamily::Uct => {
                let mut stat = UctStat::default();
                if let Some(q) = seed {
                    stat.q = q;
                    stat.n = pseudo_trials;
                }
                Stat::Uct(stat)
            }
            StatFamily::Ments => {
                let mut stat = MentsStat::default();
                if let Some(v) = seed {
                    stat.soft_value = v;
                    stat.num_backups = pseudo_trials;
                }
                Stat::Ments(stat)
            }
            StatFamily::Ball => Stat::Ball(BallListStat::new(dim)),
            StatFamily::Hull => Stat::Hull(HullStat::default()),
            StatFamily::Simplex => Stat::Simplex(SimplexStat::new(
                dim,
                config.simplex_map_splitting_option,
                config.simplex_node_l_inf_thresh,
                config.simplex_node_split_visit_thresh,
                config.simplex_node_max_depth,
            )),
            StatFamily::Hmcts => {
                let mut stat = HmctsStat::default();
                if let Some(q) = seed {
                    stat.value.q = q;
                    stat.value.n = pseudo_trials;
                }
                Stat::Hmcts(stat)
            }
        }
    }
}

fn default_reward(dim: usize, default_q: f64) -> Reward {
    if dim <= 1 {
        Reward::Scalar(default_q)
    } else {
        Reward::Vector(vec![default_q; dim])
    }
}

fn hash_observation<O: Hash>(obs: &O) -> u64 {
    let mut hasher = FxHasher::default();
    obs.hash(&mut hasher);
    hasher.finish()
}

struct PathStep<S, A> {
    dnode: Arc<DNode<S, A>>,
    cnode: Arc<CNode<S, A>>,
    reward: Reward,
}

/// Owns the shared tree and drives trials against it for one [`Environment`].
pub struct ThtsManager<E: Environment>
where
    E::Observation: From<E::State>,
{
    env: Arc<E>,
    config: ThtsManagerConfig,
    family: StatFamily,
    root: Arc<DNode<E::State, E::Action>>,
    transposition: Option<TranspositionTable<E::Observation, E::State, E::Action>>,
    trial_counter: TrialCounter,
}

impl<E> ThtsManager<E>
where
    E: Environment,
    E::Observation: From<E::State>,
{
    pub fn new(env: E, config: ThtsManagerConfig, family: StatFamily) -> ThtsResult<Self> {
        config.check_reward_dim(env.reward_dim())?;
        let dim = env.reward_dim();
        let initial_state = env.initial_state();
        let is_sink = env.is_sink_state(&initial_state);
        let heuristic = env.heuristic(&initial_state);
        let root_stat = family.fresh_stat(dim, &config, heuristic.as_ref());
        let root = DNode::new(initial_state, 0, is_sink, heuristic, root_stat);
        let transposition = if config.transposition_use_if_possible { Some(TranspositionTable::default()) } else { None };
        Ok(ThtsManager {
            env: Arc::new(env),
            config,
            family,
            root,
            transposition,
            trial_counter: TrialCounter::new(),
        })
    }

    pub fn config(&self) -> &ThtsManagerConfig {
        &self.config
    }

    pub fn trials_run(&self) -> u64 {
        self.trial_counter.get()
    }

    /// Spawns one worker per configured thread, each running trials until
    /// `cutoff` says to stop or a worker hits an unrecoverable error.
    pub fn run_trials(&self, cutoff: &dyn Cutoff) -> ThtsResult<()> {
        let num_threads = self.config.num_threads.unwrap_or_else(num_cpus::get).max(1);
        let errors: Mutex<Vec<ThtsError>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for worker_id in 0..num_threads {
                let errors = &errors;
                scope.spawn(move || {
                    let mut rng = WorkerRng::for_worker(self.config.seed, worker_id);
                    loop {
                        if cutoff.must_stop(self.trial_counter.get()) || !errors.lock().is_empty() {
                            break;
                        }
                        match self.run_one_trial(worker_id, &mut rng) {
                            Ok(()) => {
                                self.trial_counter.increment();
                            }
                            Err(e) => {
                                errors.lock().push(e);
                                break;
                            }
                        }
                    }
                });
            }
        });

        match errors.into_inner().into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_one_trial(&self, worker_id: usize, rng: &mut WorkerRng) -> ThtsResult<()> {
        let env_context = self.env.sample_context(worker_id, rng);
        let ctx = TrialContext::new(env_context, worker_id, self.config.max_depth);
        let weight = ctx.weight().map(|w| w.to_vec());

        let mut path: Vec<PathStep<E::State, E::Action>> = Vec::new();
        let mut current = self.root.clone();
        let mut depth = 0u32;

        // The trial descends until the current D-node is a sink, max_depth is
        // reached (both checked by the loop condition), or - checked by the
        // explicit `break` below - the D-node just reached was newly
        // constructed by this very trial, so its own heuristic value is the
        // best bootstrap available and there is nothing further to select.
        while !current.is_sink && depth < self.config.max_depth {
            current.counters.num_visits.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
            current.counters.add_virtual_loss();

            let actions = self.env.checked_valid_actions(&current.state)?;
            let prior = self.env.prior(&current.state);
            let action_idx = self.select_action(&current, &actions, prior.as_deref(), depth == 0, weight.as_deref(), rng)?;
            let action = actions[action_idx].clone();

            let dim = self.env.reward_dim();
            let family = self.family;
            let config = &self.config;
            let (cnode, _) = current.child_or_insert(action.clone(), || CNode::new(action.clone(), family.fresh_stat(dim, config, None)));
            cnode.counters.add_virtual_loss();
            current.check_visit_invariant()?;

            let reward = self.env.reward(&current.state, &action, &ctx.env_context);
            let next_state = self.env.sample_transition(&current.state, &action, rng);
            let observation = self.env.observation_to_state(&action, &next_state);
            let next_depth = depth + 1;

            let (next_dnode, freshly_created) = if let Some(table) = &self.transposition {
                if let Some(existing) = table.get(&observation, next_depth) {
                    let obs_key = hash_observation(&observation);
                    let (node, _) = cnode.child_or_insert(obs_key, || existing.clone());
                    (node, false)
                } else {
                    let node = self.new_dnode(&next_state, next_depth);
                    table.insert(observation.clone(), next_depth, &node);
                    let obs_key = hash_observation(&observation);
                    let (attached, _) = cnode.child_or_insert(obs_key, || node.clone());
                    (attached, true)
                }
            } else {
                let obs_key = hash_observation(&observation);
                cnode.child_or_insert(obs_key, || self.new_dnode(&next_state, next_depth))
            };

            path.push(PathStep { dnode: current.clone(), cnode, reward });
            current = next_dnode;
            depth = next_depth;

            if freshly_created {
                break;
            }
        }

        let dim = self.env.reward_dim();
        let mut value = if current.is_sink {
            if dim <= 1 {
                Reward::zero_scalar()
            } else {
                Reward::zero_vector(dim)
            }
        } else {
            current
                .heuristic_value
                .clone()
                .unwrap_or_else(|| default_reward(dim, self.config.default_q_value))
        };

        for step in path.into_iter().rev() {
            value = step.reward + value;
            self.backup_step(&step.dnode, &step.cnode, &value, weight.as_deref(), rng)?;
            step.dnode.counters.remove_virtual_loss();
            step.cnode.counters.remove_virtual_loss();
            step.cnode.counters.num_backups.fetch_add(1, std::sync::atomic::Ordering::AcqRel);
        }

        Ok(())
    }

    fn new_dnode(&self, state: &E::State, depth: u32) -> Arc<DNode<E::State, E::Action>> {
        let is_sink = self.env.is_sink_state(state);
        let heuristic = self.env.heuristic(state);
        let dim = self.env.reward_dim();
        let stat = self.family.fresh_stat(dim, &self.config, heuristic.as_ref());
        DNode::new(state.clone(), depth, is_sink, heuristic, stat)
    }

    fn select_action(
        &self,
        dnode: &Arc<DNode<E::State, E::Action>>,
        actions: &[E::Action],
        prior: Option<&[(E::Action, f64)]>,
        is_root: bool,
        weight: Option<&[f64]>,
        rng: &mut WorkerRng,
    ) -> ThtsResult<usize> {
        let children = dnode.children();
        let parent_visits = dnode.counters.visits();

        match self.family {
            StatFamily::Uct => {
                let snapshots: Vec<Option<UctStat>> = actions
                    .iter()
                    .map(|a| children.iter().find(|(ca, _)| ca == a).map(|(_, c)| c.with_stat_mut(|s| s.as_uct_mut().unwrap().clone())))
                    .collect();
                let views: Vec<UctChildView> = actions
                    .iter()
                    .enumerate()
                    .map(|(i, a)| UctChildView {
                        existing: snapshots[i].as_ref(),
                        prior_weight: prior.and_then(|p| p.iter().find(|(pa, _)| pa == a).map(|(_, w)| *w)),
                        virtual_losses: children
                            .iter()
                            .find(|(ca, _)| ca == a)
                            .map(|(_, c)| c.counters.in_flight())
                            .unwrap_or(0),
                    })
                    .collect();
                Ok(uct::select_child(&views, parent_visits, &self.config, rng))
            }
            StatFamily::Ments => Ok(self.select_ments(&children, actions, prior, is_root, parent_visits, rng)),
            StatFamily::Ball => self.select_by_score(actions, &children, rng, |cnode| {
                let w = weight.expect("ball-list family requires a per-trial weight");
                cnode.with_stat_mut(|s| match s.as_ball_mut() {
                    Some(b) => b.index_for(w, 1.0, self.config.cpuct_exploration).map(Some),
                    None => Ok(None),
                })
            }),
            StatFamily::Hull => self.select_by_score(actions, &children, rng, |cnode| {
                let w = weight.expect("hull family requires a per-trial weight");
                Ok(cnode.with_stat_mut(|s| {
                    s.as_hull_mut()
                        .and_then(|h| h.recommend(w))
                        .map(|p| p.value.iter().zip(w.iter()).map(|(a, b)| a * b).sum::<f64>())
                }))
            }),
            StatFamily::Simplex => self.select_by_score(actions, &children, rng, |cnode| {
                let w = weight.expect("simplex-map family requires a per-trial weight");
                cnode.with_stat_mut(|s| match s.as_simplex_mut() {
                    Some(sx) => {
                        let leaf = sx.leaf_for(w)?;
                        let ngv_id = sx.closest_ngv(leaf, w);
                        let ngv = sx.ngv(ngv_id);
                        Ok(Some(w.iter().zip(ngv.value.iter()).map(|(a, b)| a * b).sum::<f64>()))
                    }
                    None => Ok(None),
                })
            }),
            StatFamily::Hmcts => Ok(self.select_hmcts(dnode, actions, &children)),
        }
    }

    /// MENTS-family selection, dispatching on `config.ments_variant`: DENTS
    /// mixes in a value-temperature-weighted subtree entropy bonus, RENTS
    /// replaces the static prior with the parent's own empirical (visit-count)
    /// policy, and TENTS selects via sparsemax instead of Boltzmann.
    fn select_ments(
        &self,
        children: &[(E::Action, Arc<CNode<E::State, E::Action>>)],
        actions: &[E::Action],
        prior: Option<&[(E::Action, f64)]>,
        is_root: bool,
        parent_visits: u64,
        rng: &mut WorkerRng,
    ) -> usize {
        use crate::config::MentsVariant;

        let temp = ments::decayed_temp(
            self.config.temp_decay_fn,
            self.config.temp,
            self.config.temp_decay_min_temp,
            parent_visits,
            self.config.temp_decay_visits_scale,
            self.config.temp_decay_root_node_visits_scale,
            is_root,
        );
        let value_temp = ments::decayed_temp(
            self.config.value_temp_decay_fn,
            self.config.value_temp_init,
            self.config.value_temp_decay_min_temp,
            parent_visits,
            self.config.value_temp_decay_visits_scale,
            self.config.value_temp_decay_visits_scale,
            is_root,
        );
        let pseudo_qs: Vec<f64> = actions
            .iter()
            .map(|a| {
                let existing_child = children.iter().find(|(ca, _)| ca == a).map(|(_, c)| c);
                let existing = existing_child.map(|c| c.with_stat_mut(|s| s.as_ments_mut().unwrap().soft_value));
                let prior_w = prior.and_then(|p| p.iter().find(|(pa, _)| pa == a).map(|(_, w)| *w));
                let mut pq = ments::pseudo_q(existing, prior_w, self.config.default_q_value, 1.0);
                if self.config.ments_variant == MentsVariant::Dents {
                    let entropy = existing_child.map(|c| c.with_stat_mut(|s| s.as_ments_mut().unwrap().subtree_entropy)).unwrap_or(0.0);
                    pq += value_temp * entropy;
                }
                pq
            })
            .collect();

        // `min(epsilon / log(num_visits + 1), max_explore_prob)`: at zero
        // visits `log(1) == 0`, so the cap alone governs the mixing weight.
        let base_epsilon = if is_root { self.config.root_node_epsilon } else { self.config.epsilon };
        let log_n = ((parent_visits + 1) as f64).ln();
        let lambda = if log_n > 0.0 {
            (base_epsilon / log_n).min(self.config.max_explore_prob)
        } else {
            self.config.max_explore_prob
        };

        let prior_mix = match self.config.ments_variant {
            MentsVariant::Rents => {
                let visit_counts: Vec<f64> = actions
                    .iter()
                    .map(|a| children.iter().find(|(ca, _)| ca == a).map(|(_, c)| c.counters.visits() as f64).unwrap_or(0.0))
                    .collect();
                let lambda_tilde = self.config.prior_policy_search_weight / (parent_visits as f64 + 3.0).ln().max(1.0);
                Some((visit_counts, lambda_tilde))
            }
            _ => prior.map(|p| {
                let weights: Vec<f64> = actions.iter().map(|a| p.iter().find(|(pa, _)| pa == a).map(|(_, w)| *w).unwrap_or(0.0)).collect();
                let lambda_tilde = self.config.prior_policy_search_weight / (parent_visits as f64 + 3.0).ln().max(1.0);
                (weights, lambda_tilde)
            }),
        };

        if self.config.ments_variant == MentsVariant::Tents {
            let (_, policy) = ments::sparsemax(&pseudo_qs, temp);
            ments::sample_policy(&policy, rng)
        } else {
            let policy = ments::selection_policy(&pseudo_qs, temp, lambda, prior_mix.as_ref().map(|(w, l)| (w.as_slice(), *l)));
            ments::sample_policy(&policy, rng)
        }
    }

    /// Sequential-halving selection: seeds the surviving action set on this
    /// node's first visit, round-robins within it, and halves it by current
    /// average value once each round's budget is spent.
    fn select_hmcts(
        &self,
        dnode: &Arc<DNode<E::State, E::Action>>,
        actions: &[E::Action],
        children: &[(E::Action, Arc<CNode<E::State, E::Action>>)],
    ) -> usize {
        let n = actions.len();
        dnode.with_stat_mut(|s| {
            let st = s.as_hmcts_mut().unwrap();
            if st.surviving.is_none() {
                st.surviving = Some((0..n).collect());
                st.original_n = n;
                st.round = 0;
                st.round_budget_used = 0;
            }
            let mut surviving = st.surviving.clone().unwrap();
            if surviving.len() == 1 {
                return surviving[0];
            }
            let schedule = hmcts::round_schedule(st.original_n, self.config.hmcts_total_budget);
            let round = (st.round as usize).min(schedule.len() - 1);
            if st.round_budget_used >= schedule[round] && st.round as usize + 1 < schedule.len() {
                let values: Vec<f64> = (0..n)
                    .map(|i| {
                        children
                            .iter()
                            .find(|(a, _)| *a == actions[i])
                            .map(|(_, c)| c.with_stat_mut(|cs| cs.as_hmcts_mut().unwrap().value.q))
                            .unwrap_or(self.config.default_q_value)
                    })
                    .collect();
                surviving = hmcts::halve(&surviving, &values);
                st.surviving = Some(surviving.clone());
                st.round += 1;
                st.round_budget_used = 0;
                if surviving.len() == 1 {
                    return surviving[0];
                }
            }
            st.round_budget_used += 1;
            surviving[(st.round_budget_used as usize - 1) % surviving.len()]
        })
    }

    /// Shared unvisited-first-then-max-score selection used by the
    /// multi-objective families, which don't carry a UCB1-style exploration
    /// bonus of their own (the ball/hull/simplex coverage structures already
    /// encode "explore the uncertain region"). `score_of` may itself fail
    /// (e.g. a simplex coverage check), in which case the failure is fatal
    /// and propagated rather than treated as "no score".
    fn select_by_score(
        &self,
        actions: &[E::Action],
        children: &[(E::Action, Arc<CNode<E::State, E::Action>>)],
        rng: &mut WorkerRng,
        score_of: impl Fn(&Arc<CNode<E::State, E::Action>>) -> ThtsResult<Option<f64>>,
    ) -> ThtsResult<usize> {
        if let Some(unvisited) = actions.iter().position(|a| !children.iter().any(|(ca, _)| ca == a)) {
            return Ok(unvisited);
        }
        let mut best_indices = Vec::new();
        let mut best = f64::NEG_INFINITY;
        for (i, a) in actions.iter().enumerate() {
            let (_, cnode) = children.iter().find(|(ca, _)| ca == a).expect("all actions have a child by this point");
            let score = score_of(cnode)?.unwrap_or(self.config.default_q_value);
            if score > best {
                best = score;
                best_indices.clear();
                best_indices.push(i);
            } else if score == best {
                best_indices.push(i);
            }
        }
        Ok(best_indices[rng.get_rand_int(0, best_indices.len())])
    }

    fn backup_step(
        &self,
        dnode: &Arc<DNode<E::State, E::Action>>,
        cnode: &Arc<CNode<E::State, E::Action>>,
        value: &Reward,
        weight: Option<&[f64]>,
        rng: &mut WorkerRng,
    ) -> ThtsResult<()> {
        use crate::config::MentsVariant;

        let scalarized = value.scalarize(weight);
        match self.family {
            StatFamily::Uct => {
                cnode.with_stat_mut(|s| {
                    let stat = s.as_uct_mut().unwrap();
                    if self.config.mcts_mode {
                        stat.backup_dp(scalarized);
                    } else {
                        stat.backup(scalarized);
                    }
                });
                dnode.with_stat_mut(|s| {
                    let stat = s.as_uct_mut().unwrap();
                    if self.config.mcts_mode {
                        stat.backup_dp(scalarized);
                    } else {
                        stat.backup(scalarized);
                    }
                });
            }
            StatFamily::Ments => {
                // DB-MENTS always maintains the parallel DP value (used for
                // recommendation) regardless of `mcts_mode`; the other
                // variants only do so when running in DP mode.
                cnode.with_stat_mut(|s| s.as_ments_mut().unwrap().backup_soft(scalarized));
                if self.config.mcts_mode || self.config.ments_variant == MentsVariant::DbMents {
                    cnode.with_stat_mut(|s| s.as_ments_mut().unwrap().backup_dp(scalarized));
                }
                let child_qs: Vec<f64> = dnode
                    .children()
                    .iter()
                    .map(|(_, c)| c.with_stat_mut(|s| s.as_ments_mut().unwrap().soft_value))
                    .collect();
                dnode.with_stat_mut(|s| s.as_ments_mut().unwrap().backup_soft_d(&child_qs, self.config.temp, 1.0));
                if self.config.ments_variant == MentsVariant::Dents && !child_qs.is_empty() {
                    let policy = ments::selection_policy(&child_qs, self.config.temp, 0.0, None);
                    let entropy = ments::local_entropy(&policy);
                    dnode.with_stat_mut(|s| s.as_ments_mut().unwrap().subtree_entropy = entropy);
                }
            }
            StatFamily::Ball => {
                let w = weight.expect("ball-list family requires a per-trial weight");
                let trial_return = as_vector(value);
                cnode.with_stat_mut(|s| {
                    if let Some(ball_list) = s.as_ball_mut() {
                        let chosen = ball_list.relevant_balls(w).first().copied().unwrap_or(0);
                        ball_list.backup(chosen, &trial_return, w, self.config.num_backups_before_allowed_to_split as u64);
                    }
                });
            }
            StatFamily::Hull => {
                let trial_return = as_vector(value);
                cnode.with_stat_mut(|s| -> ThtsResult<()> {
                    if let Some(hull) = s.as_hull_mut() {
                        hull.add_and_prune(&[(trial_return, 0usize)])?;
                    }
                    Ok(())
                })?;
                // The D-node's own hull is the union of its children's hulls,
                // not a Minkowski sum: fold this C-node's current points in,
                // tagged by which action they came through.
                let action_idx = dnode.children().iter().position(|(_, c)| Arc::ptr_eq(c, cnode)).unwrap_or(0);
                let addend: Vec<(Vec<f64>, usize)> = cnode.with_stat_mut(|s| {
                    s.as_hull_mut()
                        .map(|h| h.points().iter().map(|p| (p.value.clone(), action_idx)).collect())
                        .unwrap_or_default()
                });
                dnode.with_stat_mut(|s| -> ThtsResult<()> {
                    if let Some(hull) = s.as_hull_mut() {
                        hull.union_and_prune(&addend)?;
                    }
                    Ok(())
                })?;
            }
            StatFamily::Simplex => {
                let w = weight.expect("simplex-map family requires a per-trial weight");
                let trial_return = as_vector(value);
                cnode.with_stat_mut(|s| -> ThtsResult<()> {
                    if let Some(sx) = s.as_simplex_mut() {
                        sx.backup(w, trial_return, 0.0, self.config.backup_all_vertices_of_simplex, rng)?;
                    }
                    Ok(())
                })?;
            }
            StatFamily::Hmcts => {
                cnode.with_stat_mut(|s| s.as_hmcts_mut().unwrap().backup(scalarized));
                dnode.with_stat_mut(|s| s.as_hmcts_mut().unwrap().backup(scalarized));
            }
        }
        Ok(())
    }

    /// The root's recommended action once search has run: most-visited if
    /// configured, otherwise the best-scoring action at `weight` (ignored
    /// for single-objective families).
    pub fn recommend_action(&self, weight: Option<&[f64]>) -> Option<E::Action> {
        let children = self.root.children();
        if children.is_empty() {
            // Zero trials ever selected a child from the root (a budget of
            // zero, or every trial terminated before selection): fall back
            // to the environment's own prior, or the first legal action if
            // it has none, rather than reporting no recommendation at all.
            let actions = self.env.valid_actions(&self.root.state);
            if actions.is_empty() {
                return None;
            }
            let prior = self.env.prior(&self.root.state);
            return match prior {
                Some(p) => p
                    .iter()
                    .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                    .map(|(a, _)| a.clone())
                    .or_else(|| actions.first().cloned()),
                None => actions.first().cloned(),
            };
        }
        if self.config.recommend_most_visited {
            return children.iter().max_by_key(|(_, c)| c.counters.visits()).map(|(a, _)| a.clone());
        }
        let threshold = self.config.recommend_visit_threshold as u64;
        let eligible: Vec<&(E::Action, Arc<CNode<E::State, E::Action>>)> = children.iter().filter(|(_, c)| c.counters.visits() >= threshold).collect();
        let pool = if eligible.is_empty() { children.iter().collect() } else { eligible };
        pool.into_iter()
            .max_by(|(_, a), (_, b)| self.score_for_recommend(a, weight).partial_cmp(&self.score_for_recommend(b, weight)).unwrap())
            .map(|(a, _)| a.clone())
    }

    /// Scores a child for `recommend_action`. Ball/Simplex scoring can fail
    /// (a broken coverage invariant); at recommend-time that degrades to
    /// "least preferred" rather than propagating, since the search has
    /// already completed and a best-effort answer is better than none.
    fn score_for_recommend(&self, cnode: &Arc<CNode<E::State, E::Action>>, weight: Option<&[f64]>) -> f64 {
        cnode.with_stat_mut(|s| match s {
            Stat::Uct(u) => u.q,
            Stat::Ments(m) => m.dp_value.unwrap_or(m.soft_value),
            Stat::Ball(b) => weight.and_then(|w| b.index_for(w, 1.0, 0.0).ok()).unwrap_or(f64::NEG_INFINITY),
            Stat::Hull(h) => weight
                .and_then(|w| h.recommend(w))
                .map(|p| p.value.iter().zip(weight.unwrap().iter()).map(|(a, b)| a * b).sum())
                .unwrap_or(f64::NEG_INFINITY),
            Stat::Simplex(sx) => weight
                .and_then(|w| {
                    sx.leaf_for(w).ok().map(|leaf| {
                        let ngv = sx.ngv(sx.closest_ngv(leaf, w));
                        w.iter().zip(ngv.value.iter()).map(|(a, b)| a * b).sum()
                    })
                })
                .unwrap_or(f64::NEG_INFINITY),
            Stat::Hmcts(h) => h.value.q,
        })
    }

    pub fn root(&self) -> &Arc<DNode<E::State, E::Action>> {
        &self.root
    }
}

fn as_vector(value: &Reward) -> Vec<f64> {
    match value {
        Reward::Scalar(v) => vec![*v],
        Reward::Vector(v) => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThtsManagerConfigBuilder;
    use crate::cutoff::TrialBudget;
    use crate::env::Context;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct GridState(u8, u8);

    impl From<GridState> for GridState {
        fn from(s: GridState) -> GridState {
            s
        }
    }

    struct GridWorld {
        goal: GridState,
    }

    impl Environment for GridWorld {
        type State = GridState;
        type Action = (i8, i8);
        type Observation = GridState;

        fn initial_state(&self) -> Self::State {
            GridState(0, 0)
        }

        fn is_sink_state(&self, state: &Self::State) -> bool {
            *state == self.goal
        }

        fn valid_actions(&self, state: &Self::State) -> Vec<Self::Action> {
            if self.is_sink_state(state) {
                Vec::new()
            } else {
                vec![(1, 0), (0, 1)]
            }
        }

        fn sample_transition(&self, state: &Self::State, action: &Self::Action, _rng: &mut WorkerRng) -> Self::State {
            let x = (state.0 as i8 + action.0).clamp(0, self.goal.0 as i8) as u8;
            let y = (state.1 as i8 + action.1).clamp(0, self.goal.1 as i8) as u8;
            GridState(x, y)
        }

        fn reward(&self, _state: &Self::State, _action: &Self::Action, _ctx: &Context) -> Reward {
            Reward::Scalar(-1.0)
        }
    }

    #[test]
    fn uct_search_reaches_the_goal_and_recommends_a_move() {
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default().max_depth(20u32).num_threads(Some(2usize)).build().unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Uct).unwrap();
        manager.run_trials(&TrialBudget::new(300)).unwrap();
        assert!(manager.trials_run() >= 300);
        assert!(manager.recommend_action(None).is_some());
    }

    #[test]
    fn ments_search_runs_without_error_and_recommends_a_move() {
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default().max_depth(20u32).temp(0.5).num_threads(Some(1usize)).build().unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Ments).unwrap();
        manager.run_trials(&TrialBudget::new(200)).unwrap();
        assert!(manager.recommend_action(None).is_some());
    }

    struct MultiObjectiveGrid {
        goal: GridState,
    }

    impl Environment for MultiObjectiveGrid {
        type State = GridState;
        type Action = (i8, i8);
        type Observation = GridState;

        fn initial_state(&self) -> Self::State {
            GridState(0, 0)
        }

        fn is_sink_state(&self, state: &Self::State) -> bool {
            *state == self.goal
        }

        fn valid_actions(&self, state: &Self::State) -> Vec<Self::Action> {
            if self.is_sink_state(state) {
                Vec::new()
            } else {
                vec![(1, 0), (0, 1)]
            }
        }

        fn sample_transition(&self, state: &Self::State, action: &Self::Action, _rng: &mut WorkerRng) -> Self::State {
            let x = (state.0 as i8 + action.0).clamp(0, self.goal.0 as i8) as u8;
            let y = (state.1 as i8 + action.1).clamp(0, self.goal.1 as i8) as u8;
            GridState(x, y)
        }

        fn reward_dim(&self) -> usize {
            2
        }

        fn reward(&self, _state: &Self::State, action: &Self::Action, _ctx: &Context) -> Reward {
            Reward::Vector(vec![action.0 as f64, action.1 as f64])
        }
    }

    #[test]
    fn ball_family_runs_without_error_on_a_multi_objective_domain() {
        let env = MultiObjectiveGrid { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default().max_depth(20u32).reward_dim(Some(2usize)).num_threads(Some(1usize)).build().unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Ball).unwrap();
        manager.run_trials(&TrialBudget::new(50)).unwrap();
        assert!(manager.recommend_action(Some(&[0.5, 0.5])).is_some());
    }

    #[test]
    fn simplex_family_runs_without_error_on_a_multi_objective_domain() {
        let env = MultiObjectiveGrid { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default().max_depth(20u32).reward_dim(Some(2usize)).num_threads(Some(1usize)).build().unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Simplex).unwrap();
        manager.run_trials(&TrialBudget::new(50)).unwrap();
        assert!(manager.recommend_action(Some(&[0.3, 0.7])).is_some());
    }

    #[test]
    fn hmcts_family_runs_without_error_and_recommends_a_move() {
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default()
            .max_depth(20u32)
            .hmcts_total_budget(8u32)
            .num_threads(Some(1usize))
            .build()
            .unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Hmcts).unwrap();
        manager.run_trials(&TrialBudget::new(200)).unwrap();
        assert!(manager.recommend_action(None).is_some());
    }

    #[test]
    fn dents_variant_runs_without_error_and_recommends_a_move() {
        use crate::config::MentsVariant;
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default()
            .max_depth(20u32)
            .temp(0.5)
            .ments_variant(MentsVariant::Dents)
            .num_threads(Some(1usize))
            .build()
            .unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Ments).unwrap();
        manager.run_trials(&TrialBudget::new(200)).unwrap();
        assert!(manager.recommend_action(None).is_some());
    }

    #[test]
    fn tents_variant_runs_without_error_and_recommends_a_move() {
        use crate::config::MentsVariant;
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default()
            .max_depth(20u32)
            .temp(0.5)
            .ments_variant(MentsVariant::Tents)
            .num_threads(Some(1usize))
            .build()
            .unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Ments).unwrap();
        manager.run_trials(&TrialBudget::new(200)).unwrap();
        assert!(manager.recommend_action(None).is_some());
    }

    #[test]
    fn recommend_action_falls_back_to_the_prior_when_root_has_no_children() {
        let env = GridWorld { goal: GridState(2, 2) };
        let config = ThtsManagerConfigBuilder::default().build().unwrap();
        let manager = ThtsManager::new(env, config, StatFamily::Uct).unwrap();
        assert_eq!(Some((1, 0)), manager.recommend_action(None));
    }
}
