// Copyright 2020 Xavier Gillard
//
// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! A generic, thread-safe core for trial-based heuristic tree search.
//!
//! This crate implements the trial-pool loop shared by UCT, MENTS and its
//! variants (DENTS, RENTS, TENTS, DB-MENTS), and three multi-objective
//! extensions over a linear-scalarisation weight simplex: CZT's ball-list,
//! CHMCTS' convex hull, and the SMBTS/SMDENTS simplex map. None of these
//! know anything about the domain being searched: callers implement
//! [`Environment`](env::Environment) once and pick a [`StatFamily`](engine::StatFamily)
//! to search with.
//!
//! ```no_run
//! use thts_core::config::ThtsManagerConfigBuilder;
//! use thts_core::cutoff::TrialBudget;
//! use thts_core::engine::{StatFamily, ThtsManager};
//! use thts_core::env::{Context, Environment};
//! use thts_core::reward::Reward;
//! use thts_core::rng::WorkerRng;
//!
//! #[derive(Clone, Eq, PartialEq, Hash)]
//! struct GridState(i32, i32);
//!
//! struct GridWorld;
//!
//! impl Environment for GridWorld {
//!     type State = GridState;
//!     type Action = (i32, i32);
//!     type Observation = GridState;
//!
//!     fn initial_state(&self) -> Self::State { GridState(0, 0) }
//!     fn is_sink_state(&self, state: &Self::State) -> bool { *state == GridState(5, 5) }
//!     fn valid_actions(&self, state: &Self::State) -> Vec<Self::Action> {
//!         if self.is_sink_state(state) { Vec::new() } else { vec![(1, 0), (0, 1)] }
//!     }
//!     fn sample_transition(&self, state: &Self::State, action: &Self::Action, _rng: &mut WorkerRng) -> Self::State {
//!         GridState((state.0 + action.0).min(5), (state.1 + action.1).min(5))
//!     }
//!     fn reward(&self, _state: &Self::State, _action: &Self::Action, _ctx: &Context) -> Reward {
//!         Reward::Scalar(-1.0)
//!     }
//! }
//!
//! let config = ThtsManagerConfigBuilder::default().max_depth(50u32).build().unwrap();
//! let manager = ThtsManager::new(GridWorld, config, StatFamily::Uct).unwrap();
//! manager.run_trials(&TrialBudget::new(1_000)).unwrap();
//! let best_first_move = manager.recommend_action(None);
//! let _ = best_first_move;
//! ```
//!
//! # Modules
//!
//! - [`env`]: the [`Environment`](env::Environment) trait a domain implements.
//! - [`config`]: [`ThtsManagerConfig`](config::ThtsManagerConfig), every tunable the engine reads.
//! - [`engine`]: the worker pool and trial loop, [`ThtsManager`](engine::ThtsManager).
//! - [`tree`]: the shared, lock-per-node D-node/C-node tree and transposition table.
//! - [`stats`]: the per-family node statistics (UCT, MENTS, ball-list, hull, simplex map).
//! - [`reward`]: the scalar-or-vector [`Reward`](reward::Reward) type.
//! - [`rng`]: per-worker seeded randomness, including simplex-weight sampling.
//! - [`distributions`]: the alias-method categorical sampler MENTS policy sampling uses.
//! - [`heap`]: the indexed max-heap behind the `use_max_heap` soft-value backup path.
//! - [`lp`]: the two-phase simplex LP solver behind CHMCTS' strong-domination pruning.
//! - [`cutoff`]: composable search-termination criteria.
//! - [`context`]: per-trial scratch state.
//! - [`error`]: the crate's [`ThtsError`](error::ThtsError) and [`ThtsResult`](error::ThtsResult).

pub mod config;
pub mod context;
pub mod cutoff;
pub mod distributions;
pub mod engine;
pub mod env;
pub mod error;
pub mod heap;
pub mod lp;
pub mod reward;
pub mod rng;
pub mod stats;
pub mod tree;

pub use config::{ThtsManagerConfig, ThtsManagerConfigBuilder};
pub use engine::{StatFamily, ThtsManager};
pub use env::Environment;
pub use error::{ThtsError, ThtsResult};
pub use reward::Reward;
