//! Hierarchical Pitman-Yor process model over discrete symbol sequences.
//!
//! The model assigns conditional probabilities to the next symbol given an
//! arbitrarily long preceding context by maintaining a hierarchy of Chinese
//! Restaurant Process "restaurants" indexed by a compacted suffix tree of
//! observed contexts. It provides:
//!
//! - Per-symbol log-loss for sequence compression
//! - Predictive distribution queries, including queries on contexts the tree
//!   has never materialized (above / below / fragmented semantics)
//! - Posterior inference over the latent seating structure via two Gibbs
//!   samplers (add/remove reseating and direct table-count resampling)
//!
//! # Structure
//!
//! - [`tree`] — the compacted suffix tree of contexts and its DFS iterators
//! - [`restaurant`] — seating-state capability traits and two concrete
//!   representations (full arrangements and compact counters)
//! - [`params`] — per-level discount/concentration store with gradient
//!   updates
//! - [`model`] — the online driver, predictors, and split handling
//! - [`rng`] — seeded sampling over unnormalized weight vectors

pub mod model;
pub mod params;
pub mod restaurant;
pub mod rng;
mod sampler;
pub mod tree;

/// A symbol drawn from the alphabet `{0, ..., K-1}`.
pub type Symbol = usize;

pub use model::{HpypModel, ModelConfig, ModelError, PredictMode};
pub use params::{GradientParameters, LevelStats, Parameters};
pub use restaurant::compact::{CountPayload, CountRestaurant};
pub use restaurant::seating::{SeatingPayload, SeatingRestaurant};
pub use restaurant::{AddRemoveRestaurant, CompactRestaurant, Restaurant, StirlingAccess};
pub use rng::SampleRng;
pub use tree::{ContextTree, DfsPaths, InsertAction, InsertionResult, PathNode, TreeError};
