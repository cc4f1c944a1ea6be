//! The environment contract consumed by the search core.
//!
//! A single trait with associated `State`, `Action` and `Observation` types,
//! required methods for the transition model, and default-implemented
//! convenience methods (heuristic, prior, context sampling) a caller may
//! override.

use crate::error::{EnvironmentError, ThtsResult};
use crate::reward::Reward;
use crate::rng::WorkerRng;

/// A decision context sampled once per trial: for multi-objective domains
/// this carries the linear-scalarisation weight drawn for that trial.
#[derive(Debug, Clone)]
pub struct Context {
    pub weight: Option<Vec<f64>>,
}

impl Context {
    pub fn scalar() -> Self {
        Context { weight: None }
    }

    pub fn with_weight(weight: Vec<f64>) -> Self {
        Context { weight: Some(weight) }
    }
}

/// The domain a [`crate::engine::ThtsEngine`] searches over.
///
/// Implementors must provide a transition model (`sample_transition`),
/// validity (`valid_actions`, `is_sink_state`) and a reward function; the
/// observation model defaults to full observability, and the heuristic/prior
/// hooks default to "none".
pub trait Environment: Send + Sync {
    type State: Clone + Eq + std::hash::Hash + Send + Sync;
    type Action: Clone + Eq + std::hash::Hash + Send + Sync;
    type Observation: Clone + Eq + std::hash::Hash + Send + Sync;

    fn initial_state(&self) -> Self::State;

    fn is_sink_state(&self, state: &Self::State) -> bool;

    /// Legal actions at `state`. Must be non-empty unless `state` is a sink;
    /// an empty result at a non-sink state is an [`EnvironmentError`].
    fn valid_actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Draws a successor state for `(state, action)` using `rng`.
    fn sample_transition(&self, state: &Self::State, action: &Self::Action, rng: &mut WorkerRng) -> Self::State;

    /// Maps a successor state to the observation a decision node would key
    /// on. Defaults to full observability (the state itself, via `Clone`).
    fn observation_to_state(&self, _action: &Self::Action, next_state: &Self::State) -> Self::Observation
    where
        Self::Observation: From<Self::State>,
    {
        Self::Observation::from(next_state.clone())
    }

    /// `1` for scalar-reward domains; the objective count `d` for
    /// multi-objective domains. Checked against `ThtsManagerConfig::reward_dim`.
    fn reward_dim(&self) -> usize {
        1
    }

    fn reward(&self, state: &Self::State, action: &Self::Action, ctx: &Context) -> Reward;

    /// Draws the per-trial context. The default for multi-objective domains
    /// (`reward_dim() > 1`) samples a uniform-random simplex weight via
    /// normalised exponentials; scalar domains get the empty context.
    fn sample_context(&self, _worker_id: usize, rng: &mut WorkerRng) -> Context {
        let d = self.reward_dim();
        if d <= 1 {
            Context::scalar()
        } else {
            Context::with_weight(rng.sample_simplex_weight(d))
        }
    }

    /// Optional heuristic value evaluated once at node creation for
    /// non-sink states. `None` disables heuristic seeding.
    fn heuristic(&self, _state: &Self::State) -> Option<Reward> {
        None
    }

    /// Optional prior policy evaluated once at node creation. `None`
    /// disables prior mixing, regardless of `prior_policy_search_weight`.
    fn prior(&self, _state: &Self::State) -> Option<Vec<(Self::Action, f64)>> {
        None
    }

    /// Validates that `valid_actions` returned at least one action at a
    /// non-sink state, converting a contract violation into an
    /// [`EnvironmentError`] rather than letting the engine panic on it.
    fn checked_valid_actions(&self, state: &Self::State) -> ThtsResult<Vec<Self::Action>> {
        let actions = self.valid_actions(state);
        if actions.is_empty() && !self.is_sink_state(state) {
            return Err(EnvironmentError::EmptyActionSetAtNonSink.into());
        }
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Eq, PartialEq, Hash)]
    struct GridState(i32, i32);

    struct GridWorld;

    impl Environment for GridWorld {
        type State = GridState;
        type Action = (i32, i32);
        type Observation = GridState;

        fn initial_state(&self) -> Self::State {
            GridState(0, 0)
        }

        fn is_sink_state(&self, state: &Self::State) -> bool {
            *state == GridState(2, 2)
        }

        fn valid_actions(&self, state: &Self::State) -> Vec<Self::Action> {
            if self.is_sink_state(state) {
                Vec::new()
            } else {
                vec![(1, 0), (0, 1)]
            }
        }

        fn sample_transition(&self, state: &Self::State, action: &Self::Action, _rng: &mut WorkerRng) -> Self::State {
            GridState((state.0 + action.0).min(2), (state.1 + action.1).min(2))
        }

        fn reward(&self, state: &Self::State, _action: &Self::Action, _ctx: &Context) -> Reward {
            if self.is_sink_state(state) {
                Reward::Scalar(1.0)
            } else {
                Reward::Scalar(0.0)
            }
        }
    }

    #[test]
    fn empty_action_set_at_non_sink_is_an_environment_error() {
        struct Broken;
        impl Environment for Broken {
            type State = ();
            type Action = ();
            type Observation = ();

            fn initial_state(&self) -> Self::State {}
            fn is_sink_state(&self, _state: &Self::State) -> bool {
                false
            }
            fn valid_actions(&self, _state: &Self::State) -> Vec<Self::Action> {
                Vec::new()
            }
            fn sample_transition(&self, _s: &Self::State, _a: &Self::Action, _rng: &mut WorkerRng) -> Self::State {}
            fn reward(&self, _s: &Self::State, _a: &Self::Action, _ctx: &Context) -> Reward {
                Reward::zero_scalar()
            }
        }

        let env = Broken;
        assert!(env.checked_valid_actions(&()).is_err());
    }

    #[test]
    fn sink_state_permits_empty_action_set() {
        let env = GridWorld;
        assert!(env.checked_valid_actions(&GridState(2, 2)).unwrap().is_empty());
    }

    #[test]
    fn scalar_domain_samples_empty_context() {
        let env = GridWorld;
        let mut rng = WorkerRng::from_seed(1);
        let ctx = env.sample_context(0, &mut rng);
        assert!(ctx.weight.is_none());
    }
}
