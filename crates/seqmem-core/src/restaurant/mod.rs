//! Seating-state capabilities for context-tree nodes.
//!
//! A restaurant models one node's seating state: per-symbol customers `c_w`
//! (observations, or tables sent up by children) and tables `t_w` (draws
//! from the parent). The strategy object is stateless; all per-node state
//! lives in its `Payload`, owned by the tree.
//!
//! Capabilities are split so samplers declare what they need at the type
//! level:
//!
//! - [`Restaurant`]: probability queries, seating of new customers, and
//!   counter access. Enough for prediction and online insertion.
//! - [`AddRemoveRestaurant`]: removal (for sliding-window forgetting and
//!   reseating Gibbs) and re-partitioning on context-tree splits.
//! - [`CompactRestaurant`]: direct counter writes, used by the
//!   table-marginal Gibbs sampler. That sampler additionally requires the
//!   auxiliary data to expose Stirling numbers ([`StirlingAccess`]), which
//!   is enforced by trait bounds rather than runtime casts.

pub mod compact;
pub mod seating;

use crate::rng::SampleRng;
use crate::Symbol;

/// Base capability: predictive probability, seating, and counters.
pub trait Restaurant {
    /// Per-node seating state. `Default` is the empty restaurant, which
    /// doubles as the factory for transient payloads.
    type Payload: Default + std::fmt::Debug;

    /// Per-level scratch data for samplers, bound to one (discount,
    /// concentration) pair; released by drop.
    type Aux;

    /// The Pitman-Yor predictive
    /// `(c_w - d t_w)/(a + c) + ((a + d t)/(a + c)) * parent` for a
    /// populated restaurant, or `parent` when empty.
    fn compute_probability(
        &self,
        payload: &Self::Payload,
        symbol: Symbol,
        parent_prob: f64,
        discount: f64,
        concentration: f64,
    ) -> f64;

    /// Seat one customer of `symbol`. Returns the fraction of a new table
    /// opened by the seating (0 or 1 for integer representations); a new
    /// table at this level adds a customer at the parent.
    #[allow(clippy::too_many_arguments)]
    fn add_customer(
        &self,
        payload: &mut Self::Payload,
        symbol: Symbol,
        parent_prob: f64,
        discount: f64,
        concentration: f64,
        fraction: f64,
        rng: &mut SampleRng,
    ) -> f64;

    fn customers(&self, payload: &Self::Payload) -> usize;
    fn tables(&self, payload: &Self::Payload) -> usize;
    fn customers_of(&self, payload: &Self::Payload, symbol: Symbol) -> usize;
    fn tables_of(&self, payload: &Self::Payload, symbol: Symbol) -> usize;

    /// Symbols with at least one customer.
    fn types(&self, payload: &Self::Payload) -> Vec<Symbol>;

    /// Internal row/total consistency of one payload.
    fn check_consistency(&self, payload: &Self::Payload) -> bool;

    /// Short human-readable rendering of the seating state.
    fn describe(&self, payload: &Self::Payload) -> String;

    /// Build the per-level auxiliary data for `payload` under the given
    /// parameters.
    fn make_aux(&self, payload: &Self::Payload, discount: f64, concentration: f64) -> Self::Aux;
}

/// Removal and split re-partitioning.
pub trait AddRemoveRestaurant: Restaurant {
    /// Remove one customer of `symbol`. Returns the fraction of a table
    /// closed by the removal (0 when the seating kept its table count, or
    /// when there was no such customer); a closed table removes a customer
    /// at the parent. `aux` may be absent, in which case an implementation
    /// needing scratch data rebuilds it locally.
    fn remove_customer(
        &self,
        payload: &mut Self::Payload,
        symbol: Symbol,
        discount: f64,
        aux: Option<&mut Self::Aux>,
        fraction: f64,
        rng: &mut SampleRng,
    ) -> f64;

    /// Re-partition `longer`'s seating after the context edge above it was
    /// cut, populating `shorter` (the new intermediate). `discount_before`
    /// is `longer`'s discount under its old parent, `discount_after` its
    /// discount under `shorter`. Marginally, `shorter` becomes a draw from
    /// a Pitman-Yor with the old parent and `longer` a draw with parent
    /// `shorter`; `shorter`'s tables are exactly `longer`'s old tables, so
    /// counts above the split are untouched.
    ///
    /// With `only_update_shorter`, `longer` is left unmodified (transient
    /// fragmentation for prediction).
    #[allow(clippy::too_many_arguments)]
    fn update_after_split(
        &self,
        longer: &mut Self::Payload,
        shorter: &mut Self::Payload,
        discount_before: f64,
        discount_after: f64,
        only_update_shorter: bool,
        rng: &mut SampleRng,
    );
}

/// Direct counter writes for the table-marginal Gibbs sampler.
pub trait CompactRestaurant: AddRemoveRestaurant {
    fn set_customers(&self, payload: &mut Self::Payload, symbol: Symbol, customers: usize);
    fn set_tables(&self, payload: &mut Self::Payload, symbol: Symbol, tables: usize);
}

/// Auxiliary data exposing log generalized Stirling numbers for the level's
/// discount.
pub trait StirlingAccess {
    fn log_stirling(&mut self, customers: usize, tables: usize) -> f64;
}

impl StirlingAccess for seqmem_math::StirlingTable {
    fn log_stirling(&mut self, customers: usize, tables: usize) -> f64 {
        seqmem_math::StirlingTable::log_stirling(self, customers, tables)
    }
}

/// Shared predictive formula.
pub(crate) fn predictive(
    cw: usize,
    tw: usize,
    c: usize,
    t: usize,
    discount: f64,
    concentration: f64,
    parent_prob: f64,
) -> f64 {
    if c == 0 {
        return parent_prob;
    }
    let denom = concentration + c as f64;
    ((cw as f64 - discount * tw as f64) + (concentration + discount * t as f64) * parent_prob)
        / denom
}

/// Shared seating decision: does the next customer of a type open a new
/// table? Weight of sharing is `c_w - d t_w`, of opening
/// `(a + d t) * parent`; an empty restaurant always opens.
pub(crate) fn draw_new_table(
    cw: usize,
    tw: usize,
    t: usize,
    discount: f64,
    concentration: f64,
    parent_prob: f64,
    rng: &mut SampleRng,
) -> bool {
    let share = cw as f64 - discount * tw as f64;
    let open = (concentration + discount * t as f64) * parent_prob;
    if share + open <= 0.0 {
        return true;
    }
    rng.accept(open / (share + open))
}
