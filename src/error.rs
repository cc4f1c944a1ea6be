//! Structured failures surfaced by the search core.
//!
//! None of these are ever swallowed: a worker that hits one other than the
//! tolerated numeric staleness cases records it and stops; the pool joins and
//! reports it to the caller of [`crate::engine::ThtsEngine::run_trials`].

use thiserror::Error;

/// The four error kinds the core can raise.
#[derive(Debug, Error)]
pub enum ThtsError {
    /// The manager configuration is internally inconsistent, or inconsistent
    /// with the environment it is paired with.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The environment violated its contract.
    #[error("environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// A numeric routine (LP solver, SVD) failed to reach a result, distinct
    /// from the recoverable "not dominated" / "no constraint" base cases.
    #[error("numeric error: {0}")]
    Numeric(#[from] NumericError),

    /// An internal invariant (§3) was violated.
    #[error("internal invariant violated: {0}")]
    InternalInvariant(#[from] InternalInvariantError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment reports reward_dim() == {env_dim}, but the manager was configured for {manager_dim} objectives")]
    RewardDimMismatch { env_dim: usize, manager_dim: usize },

    #[error("unknown simplex map splitting rule: {0:?}")]
    UnknownSimplexSplitRule(String),

    #[error("no precomputed triangulation file available for simplex dimension {0}")]
    MissingTriangulationFile(usize),

    #[error("triangulation file for dimension {0} is malformed: {1}")]
    MalformedTriangulationFile(usize, String),

    #[error("max_depth must be at least 1")]
    InvalidMaxDepth,

    #[error("invalid value for option `{option}`: {reason}")]
    InvalidOption { option: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("environment returned an empty action set at non-sink state")]
    EmptyActionSetAtNonSink,

    #[error("transition distribution does not sum to a positive probability (got {0})")]
    TransitionDistributionDoesNotSum(f64),
}

#[derive(Debug, Error)]
pub enum NumericError {
    #[error("LP solver failed to reach optimality")]
    LpNotOptimal,

    #[error("SVD used to compute a simplex splitting-hyperplane normal did not converge")]
    SvdDidNotConverge,
}

#[derive(Debug, Error)]
pub enum InternalInvariantError {
    #[error("node visit count {visits} exceeds the sum of its children's visit counts ({children_sum}) by more than the {in_flight} in-flight trials")]
    VisitCountExceedsChildren {
        visits: u64,
        children_sum: u64,
        in_flight: u64,
    },

    #[error("ball list has no relevant ball for a legal weight in the simplex")]
    NoRelevantBall,

    #[error("simplex map leaf lookup failed its coverage check for the given weight")]
    SimplexCoverageCheckFailed,
}

pub type ThtsResult<T> = Result<T, ThtsError>;
