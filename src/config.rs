//! Manager configuration: the recognised options and the validation that
//! turns an inconsistent configuration into a
//! [`ConfigError`](crate::error::ConfigError) before a single trial runs.
//!
//! A plain struct with `#[builder(default = "...")]` per field, so callers
//! only name the options they care about.

use derive_builder::Builder;

use crate::error::{ConfigError, ThtsResult};

/// Simplex-map subdivision rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplexSplittingOption {
    Ordered,
    SmallestEdgeRandomly,
    Random,
    ValueDiff,
    Triangulation,
}

/// Which MENTS variant governs selection and backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentsVariant {
    /// Plain Boltzmann selection over pseudo-Q values.
    Ments,
    /// Mixes each child's pseudo-Q with a `value_temp`-weighted subtree
    /// entropy bonus.
    Dents,
    /// Replaces the static prior mix with one derived from the parent's own
    /// empirical (visit-count) policy.
    Rents,
    /// Selects via the sparsemax policy instead of Boltzmann.
    Tents,
    /// Backs up a parallel DP value on every update (not just when
    /// `mcts_mode` is set) and recommends from it.
    DbMents,
}

/// The temperature decay schedule shared by the MENTS family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempDecay {
    /// Temperature stays at `temp` for the whole search.
    None,
    /// `temp / (1 + visits / temp_decay_visits_scale)`, floored at
    /// `temp_decay_min_temp`.
    InverseVisits,
    /// Same as `InverseVisits` but the root node uses
    /// `temp_decay_root_node_visits_scale` instead.
    InverseVisitsRootScaled,
}

/// All tunables accepted by the trial engine. Built via
/// [`ThtsManagerConfigBuilder`]; validated once by [`ThtsManagerConfig::validate`].
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), build_fn(skip))]
pub struct ThtsManagerConfig {
    /// Base seed for per-worker PRNGs.
    #[builder(default = "0")]
    pub seed: u64,
    /// Hard cap on decision depth.
    #[builder(default = "1_000")]
    pub max_depth: u32,
    /// If false, backup uses a running average from below; if true, it uses
    /// DP-style max (UCT and the DB-family).
    #[builder(default = "false")]
    pub mcts_mode: bool,
    /// Initial visit count seeded by a heuristic, when a heuristic is set.
    #[builder(default = "0")]
    pub heuristic_pseudo_trials: u32,
    /// Enables the transposition table.
    #[builder(default = "false")]
    pub transposition_use_if_possible: bool,

    /// MENTS-family base temperature.
    #[builder(default = "1.0")]
    pub temp: f64,
    #[builder(default = "TempDecay::None")]
    pub temp_decay_fn: TempDecay,
    #[builder(default = "1.0")]
    pub temp_decay_visits_scale: f64,
    #[builder(default = "1e-3")]
    pub temp_decay_min_temp: f64,
    #[builder(default = "1.0")]
    pub temp_decay_root_node_visits_scale: f64,

    /// DENTS entropy-temperature initial value and decay; reuses the same
    /// `TempDecay` shape as the value temperature.
    #[builder(default = "1.0")]
    pub value_temp_init: f64,
    #[builder(default = "TempDecay::None")]
    pub value_temp_decay_fn: TempDecay,
    #[builder(default = "1.0")]
    pub value_temp_decay_visits_scale: f64,
    #[builder(default = "1e-3")]
    pub value_temp_decay_min_temp: f64,

    /// Uniform-mixing strength at non-root nodes.
    #[builder(default = "0.0")]
    pub epsilon: f64,
    /// Uniform-mixing strength at the root.
    #[builder(default = "0.0")]
    pub root_node_epsilon: f64,
    #[builder(default = "1.0")]
    pub max_explore_prob: f64,
    /// Prior-mixing strength; decays as `1 / log(n + 3)`.
    #[builder(default = "0.0")]
    pub prior_policy_search_weight: f64,
    /// Which MENTS variant (DENTS/RENTS/TENTS/DB-MENTS) to run.
    #[builder(default = "MentsVariant::Ments")]
    pub ments_variant: MentsVariant,

    /// Minimum child visits to be considered by `recommend_action` on
    /// thresholded variants.
    #[builder(default = "0")]
    pub recommend_visit_threshold: u32,
    /// Switches the recommendation rule from best-value to most-visited.
    #[builder(default = "false")]
    pub recommend_most_visited: bool,

    /// Enables caching of the alias table sampler.
    #[builder(default = "true")]
    pub alias_use_caching: bool,
    /// How many `update` calls an alias table may absorb before a rebuild.
    #[builder(default = "1")]
    pub reconstruct_alias_table_freq: u32,
    /// Enables the O(log n) soft-value backup path via the indexed max-heap.
    #[builder(default = "false")]
    pub use_max_heap: bool,

    /// Pseudo-Q assigned to unseen children with no prior.
    #[builder(default = "0.0")]
    pub default_q_value: f64,
    /// Adds Gaussian noise to root child utilities (redrawn per selection)
    /// and smooths the root policy by exponentiation.
    #[builder(default = "None")]
    pub wide_root_noise: Option<f64>,

    #[builder(default = "0.0")]
    pub fpu_value: f64,
    #[builder(default = "true")]
    pub fpu_reduction_by_unvisited_policy: bool,

    #[builder(default = "1.0")]
    pub cpuct_exploration: f64,
    #[builder(default = "19_652.0")]
    pub cpuct_exploration_base: f64,
    #[builder(default = "false")]
    pub cpuct_exploration_log: bool,
    #[builder(default = "0.0")]
    pub cpuct_utility_stdev_prior: f64,
    #[builder(default = "0.0")]
    pub cpuct_utility_stdev_scale: f64,
    /// Replaces the fixed `cpuct_exploration` bias with
    /// `max(|Q| over children, AUTO_BIAS_MIN_BIAS)`.
    #[builder(default = "false")]
    pub adaptive_cpuct_bias: bool,

    /// Pessimistic utility a child is blended towards while another worker
    /// is in flight through it.
    #[builder(default = "-1.0")]
    pub virtual_loss_utility: f64,
    /// Strength of that blend: `vl_weight / (vl_weight + max(0.25, n))`.
    #[builder(default = "1.0")]
    pub vl_weight: f64,

    /// Ball-list split gate: a ball must accumulate this many
    /// backups before it becomes eligible for splitting.
    #[builder(default = "1")]
    pub num_backups_before_allowed_to_split: u32,

    /// Total trial budget a sequential-halving round schedule is computed
    /// against at each decision node that uses the [`crate::engine::StatFamily::Hmcts`]
    /// family.
    #[builder(default = "16")]
    pub hmcts_total_budget: u32,

    #[builder(default = "SimplexSplittingOption::Ordered")]
    pub simplex_map_splitting_option: SimplexSplittingOption,
    #[builder(default = "1e-3")]
    pub simplex_node_l_inf_thresh: f64,
    #[builder(default = "1")]
    pub simplex_node_split_visit_thresh: u32,
    #[builder(default = "64")]
    pub simplex_node_max_depth: u32,
    /// If true, backup updates all vertices of the containing simplex rather
    /// than just the nearest one.
    #[builder(default = "false")]
    pub backup_all_vertices_of_simplex: bool,

    /// Reward dimensionality expected from the environment; `None` for
    /// scalar-reward domains. Checked against `Environment::reward_dim`.
    #[builder(default = "None")]
    pub reward_dim: Option<usize>,

    /// Number of worker threads for the trial pool; `None` defaults to
    /// `num_cpus::get()` at `ThtsManager` construction time.
    #[builder(default = "None")]
    pub num_threads: Option<usize>,
}

impl ThtsManagerConfigBuilder {
    /// Builds the configuration, applying field defaults and then running
    /// [`ThtsManagerConfig::validate`].
    pub fn build(&self) -> ThtsResult<ThtsManagerConfig> {
        let config = ThtsManagerConfig {
            seed: self.seed.unwrap_or(0),
            max_depth: self.max_depth.unwrap_or(1_000),
            mcts_mode: self.mcts_mode.unwrap_or(false),
            heuristic_pseudo_trials: self.heuristic_pseudo_trials.unwrap_or(0),
            transposition_use_if_possible: self.transposition_use_if_possible.unwrap_or(false),
            temp: self.temp.unwrap_or(1.0),
            temp_decay_fn: self.temp_decay_fn.unwrap_or(TempDecay::None),
            temp_decay_visits_scale: self.temp_decay_visits_scale.unwrap_or(1.0),
            temp_decay_min_temp: self.temp_decay_min_temp.unwrap_or(1e-3),
            temp_decay_root_node_visits_scale: self.temp_decay_root_node_visits_scale.unwrap_or(1.0),
            value_temp_init: self.value_temp_init.unwrap_or(1.0),
            value_temp_decay_fn: self.value_temp_decay_fn.unwrap_or(TempDecay::None),
            value_temp_decay_visits_scale: self.value_temp_decay_visits_scale.unwrap_or(1.0),
            value_temp_decay_min_temp: self.value_temp_decay_min_temp.unwrap_or(1e-3),
            epsilon: self.epsilon.unwrap_or(0.0),
            root_node_epsilon: self.root_node_epsilon.unwrap_or(0.0),
            max_explore_prob: self.max_explore_prob.unwrap_or(1.0),
            prior_policy_search_weight: self.prior_policy_search_weight.unwrap_or(0.0),
            ments_variant: self.ments_variant.unwrap_or(MentsVariant::Ments),
            recommend_visit_threshold: self.recommend_visit_threshold.unwrap_or(0),
            recommend_most_visited: self.recommend_most_visited.unwrap_or(false),
            alias_use_caching: self.alias_use_caching.unwrap_or(true),
            reconstruct_alias_table_freq: self.reconstruct_alias_table_freq.unwrap_or(1),
            use_max_heap: self.use_max_heap.unwrap_or(false),
            default_q_value: self.default_q_value.unwrap_or(0.0),
            wide_root_noise: self.wide_root_noise.clone().unwrap_or(None),
            fpu_value: self.fpu_value.unwrap_or(0.0),
            fpu_reduction_by_unvisited_policy: self.fpu_reduction_by_unvisited_policy.unwrap_or(true),
            cpuct_exploration: self.cpuct_exploration.unwrap_or(1.0),
            cpuct_exploration_base: self.cpuct_exploration_base.unwrap_or(19_652.0),
            cpuct_exploration_log: self.cpuct_exploration_log.unwrap_or(false),
            cpuct_utility_stdev_prior: self.cpuct_utility_stdev_prior.unwrap_or(0.0),
            cpuct_utility_stdev_scale: self.cpuct_utility_stdev_scale.unwrap_or(0.0),
            adaptive_cpuct_bias: self.adaptive_cpuct_bias.unwrap_or(false),
            virtual_loss_utility: self.virtual_loss_utility.unwrap_or(-1.0),
            vl_weight: self.vl_weight.unwrap_or(1.0),
            num_backups_before_allowed_to_split: self.num_backups_before_allowed_to_split.unwrap_or(1),
            hmcts_total_budget: self.hmcts_total_budget.unwrap_or(16),
            simplex_map_splitting_option: self
                .simplex_map_splitting_option
                .unwrap_or(SimplexSplittingOption::Ordered),
            simplex_node_l_inf_thresh: self.simplex_node_l_inf_thresh.unwrap_or(1e-3),
            simplex_node_split_visit_thresh: self.simplex_node_split_visit_thresh.unwrap_or(1),
            simplex_node_max_depth: self.simplex_node_max_depth.unwrap_or(64),
            backup_all_vertices_of_simplex: self.backup_all_vertices_of_simplex.unwrap_or(false),
            reward_dim: self.reward_dim.clone().unwrap_or(None),
            num_threads: self.num_threads.clone().unwrap_or(None),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ThtsManagerConfig {
    fn validate(&self) -> ThtsResult<()> {
        if self.max_depth == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_depth",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.reconstruct_alias_table_freq == 0 {
            return Err(ConfigError::InvalidOption {
                option: "reconstruct_alias_table_freq",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.epsilon) || !(0.0..=1.0).contains(&self.root_node_epsilon) {
            return Err(ConfigError::InvalidOption {
                option: "epsilon",
                reason: "mixing strengths must lie in [0, 1]".to_string(),
            }
            .into());
        }
        if self.temp <= 0.0 || self.value_temp_init <= 0.0 {
            return Err(ConfigError::InvalidOption {
                option: "temp",
                reason: "temperatures must be strictly positive".to_string(),
            }
            .into());
        }
        if let Some(d) = self.reward_dim {
            if d == 0 {
                return Err(ConfigError::InvalidOption {
                    option: "reward_dim",
                    reason: "must be at least 1 when set".to_string(),
                }
                .into());
            }
        }
        if self.simplex_map_splitting_option == SimplexSplittingOption::Triangulation {
            return Err(ConfigError::UnknownSimplexSplitRule("Triangulation".to_string()).into());
        }
        Ok(())
    }

    /// Checks the configured `reward_dim` (if any) against what the
    /// environment actually reports.
    pub fn check_reward_dim(&self, env_reward_dim: usize) -> ThtsResult<()> {
        match self.reward_dim {
            Some(manager_dim) if manager_dim != env_reward_dim => Err(ConfigError::RewardDimMismatch {
                env_dim: env_reward_dim,
                manager_dim,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let config = ThtsManagerConfigBuilder::default().build().unwrap();
        assert_eq!(1_000, config.max_depth);
        assert!(!config.mcts_mode);
    }

    #[test]
    fn zero_max_depth_is_rejected() {
        let err = ThtsManagerConfigBuilder::default().max_depth(0u32).build().unwrap_err();
        assert!(matches!(err, crate::error::ThtsError::Config(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn epsilon_out_of_range_is_rejected() {
        let err = ThtsManagerConfigBuilder::default().epsilon(1.5).build().unwrap_err();
        assert!(matches!(err, crate::error::ThtsError::Config(ConfigError::InvalidOption { .. })));
    }

    #[test]
    fn triangulation_splitting_option_is_rejected() {
        let err = ThtsManagerConfigBuilder::default()
            .simplex_map_splitting_option(SimplexSplittingOption::Triangulation)
            .build()
            .unwrap_err();
        assert!(matches!(err, crate::error::ThtsError::Config(ConfigError::UnknownSimplexSplitRule(_))));
    }

    #[test]
    fn reward_dim_mismatch_is_detected() {
        let config = ThtsManagerConfigBuilder::default().reward_dim(Some(3usize)).build().unwrap();
        let err = config.check_reward_dim(2).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ThtsError::Config(ConfigError::RewardDimMismatch { manager_dim: 3, env_dim: 2 })
        ));
    }
}
