//! Random and distribution primitives: the seeded worker RNG lives at the
//! crate root (`crate::rng`); this module holds the sampling data structures
//! built on top of it.

pub mod alias;
pub mod mixed;
pub mod uniform;

pub use alias::CategoricalDistribution;
pub use mixed::{FlatMix, MixedDistribution};
pub use uniform::DiscreteUniform;
