//! Online model driver: scoring, seating, splits, and prediction.
//!
//! [`HpypModel`] owns the append-only symbol sequence, the context tree,
//! one restaurant strategy, the parameter store, and a seeded generator.
//! Scoring walks a root-to-leaf path of restaurants and smooths the base
//! distribution through the Pitman-Yor predictive at every level; seating
//! walks the same path leaf-to-root, propagating the fraction of a new
//! table opened at each level as a customer for the level above.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{trace, warn};

use crate::params::{LevelStats, Parameters};
use crate::restaurant::AddRemoveRestaurant;
use crate::rng::SampleRng;
use crate::tree::{ContextTree, InsertAction, PathNode, TreeError};
use crate::Symbol;

/// Errors from model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid alphabet size: {0} (must be at least 2)")]
    InvalidAlphabetSize(usize),

    #[error("invalid gradient cadence: {0} (must be at least 1)")]
    InvalidGradientCadence(usize),

    #[error("invalid gradient step: {0} (must be finite and non-negative)")]
    InvalidGradientStep(f64),

    #[error("symbol out of range: {symbol} (alphabet size is {num_types})")]
    SymbolOutOfRange { symbol: usize, num_types: usize },

    #[error("position range [{start}, {end}) out of bounds for sequence of length {len}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },

    #[error(
        "split produced impossible context lengths: parent {parent}, \
         intermediate {middle}, child {child}"
    )]
    SplitContract {
        parent: usize,
        middle: usize,
        child: usize,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Configuration for the model driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alphabet size K; symbols are drawn from `{0, ..., K-1}`.
    pub num_types: usize,

    /// Step size for the per-insertion parameter-gradient update.
    #[serde(default = "default_gradient_step")]
    pub gradient_step: f64,

    /// Apply the accumulated gradient every N online insertions.
    #[serde(default = "default_gradient_every")]
    pub gradient_every: usize,

    /// Seed for all sampling in the model.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_gradient_step() -> f64 {
    1e-4
}

fn default_gradient_every() -> usize {
    1
}

fn default_seed() -> u64 {
    0
}

impl ModelConfig {
    /// Defaults for an alphabet of `num_types` symbols.
    pub fn new(num_types: usize) -> Self {
        Self {
            num_types,
            gradient_step: default_gradient_step(),
            gradient_every: default_gradient_every(),
            seed: default_seed(),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.num_types < 2 {
            return Err(ModelError::InvalidAlphabetSize(self.num_types));
        }
        if self.gradient_every == 0 {
            return Err(ModelError::InvalidGradientCadence(self.gradient_every));
        }
        if !self.gradient_step.is_finite() || self.gradient_step < 0.0 {
            return Err(ModelError::InvalidGradientStep(self.gradient_step));
        }
        Ok(())
    }
}

/// Prediction semantics for contexts not present in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictMode {
    /// Longest suffix path that actually exists.
    Above,
    /// Account for the restaurant a split would create.
    Fragment,
    /// Longest virtual match, below any split point.
    Below,
}

/// Hierarchical Pitman-Yor model over a discrete symbol sequence.
pub struct HpypModel<R: AddRemoveRestaurant, P: Parameters> {
    pub(crate) seq: Vec<Symbol>,
    pub(crate) tree: ContextTree<R::Payload>,
    pub(crate) restaurant: R,
    pub(crate) params: P,
    pub(crate) config: ModelConfig,
    pub(crate) base_prob: f64,
    pub(crate) rng: SampleRng,
    inserts_since_step: usize,
}

impl<R: AddRemoveRestaurant, P: Parameters> HpypModel<R, P> {
    /// Create an empty model.
    pub fn new(restaurant: R, params: P, config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let base_prob = 1.0 / config.num_types as f64;
        let rng = SampleRng::from_seed(config.seed);
        Ok(Self {
            seq: Vec::new(),
            tree: ContextTree::new(),
            restaurant,
            params,
            config,
            base_prob,
            rng,
            inserts_since_step: 0,
        })
    }

    /// Append symbols to the sequence buffer (does not seat them; use the
    /// driver operations for that).
    pub fn append(&mut self, symbols: &[Symbol]) -> Result<(), ModelError> {
        for &symbol in symbols {
            self.check_symbol(symbol)?;
        }
        self.seq.extend_from_slice(symbols);
        Ok(())
    }

    pub fn sequence(&self) -> &[Symbol] {
        &self.seq
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tree(&self) -> &ContextTree<R::Payload> {
        &self.tree
    }

    pub fn restaurant(&self) -> &R {
        &self.restaurant
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    fn check_symbol(&self, symbol: Symbol) -> Result<(), ModelError> {
        if symbol >= self.config.num_types {
            return Err(ModelError::SymbolOutOfRange {
                symbol,
                num_types: self.config.num_types,
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> Result<(), ModelError> {
        if start > end || end > self.seq.len() {
            return Err(ModelError::RangeOutOfBounds {
                start,
                end,
                len: self.seq.len(),
            });
        }
        Ok(())
    }

    /// Smoothed probability at every level of `path` for `symbol`:
    /// `p[0] = 1/K`, `p[j+1]` the predictive at level `j`. Length is
    /// `path.len() + 1`.
    pub(crate) fn probability_path(
        &self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &[f64],
        symbol: Symbol,
    ) -> Vec<f64> {
        let mut probs = Vec::with_capacity(path.len() + 1);
        probs.push(self.base_prob);
        for (j, node) in path.iter().enumerate() {
            let p = self.restaurant.compute_probability(
                self.tree.payload(node.id),
                symbol,
                probs[j],
                discounts[j],
                concentrations[j],
            );
            probs.push(p);
        }
        probs
    }

    /// Seat one observation along `path`, leaf to root, propagating the
    /// new-table fraction; a zero fraction short-circuits exactly.
    pub(crate) fn update_path(
        &mut self,
        path: &[PathNode],
        probs: &[f64],
        discounts: &[f64],
        concentrations: &[f64],
        symbol: Symbol,
    ) {
        let mut fraction = 1.0;
        for j in (0..path.len()).rev() {
            fraction = self.restaurant.add_customer(
                self.tree.payload_mut(path[j].id),
                symbol,
                probs[j],
                discounts[j],
                concentrations[j],
                fraction,
                &mut self.rng,
            );
            if fraction == 0.0 {
                break;
            }
        }
    }

    /// Unseat one observation along `path`, leaf to root, propagating the
    /// closed-table fraction.
    pub(crate) fn remove_from_path(
        &mut self,
        path: &[PathNode],
        discounts: &[f64],
        symbol: Symbol,
    ) {
        let mut fraction = 1.0;
        for j in (0..path.len()).rev() {
            fraction = self.restaurant.remove_customer(
                self.tree.payload_mut(path[j].id),
                symbol,
                discounts[j],
                None,
                fraction,
                &mut self.rng,
            );
            if fraction == 0.0 {
                break;
            }
        }
    }

    /// Insert a context into the tree and re-partition seating state if the
    /// insertion cut an edge.
    fn insert_context(&mut self, start: usize, end: usize) -> Result<Vec<PathNode>, ModelError> {
        let result = self.tree.insert(&self.seq, start, end);
        match result.action {
            InsertAction::NoSplit => {}
            InsertAction::Split => {
                // intermediate is second to last; its parent sits above it
                let n = result.path.len();
                let b = result
                    .split_child
                    .map(|id| self.tree.node(id))
                    .expect("split reports the cut node");
                self.handle_split(result.path[n - 3], b, result.path[n - 2])?;
            }
            InsertAction::SplitSuffix => {
                // the inserted context is itself the new intermediate
                let n = result.path.len();
                let b = result
                    .split_child
                    .map(|id| self.tree.node(id))
                    .expect("suffix split reports the cut node");
                self.handle_split(result.path[n - 2], b, result.path[n - 1])?;
            }
        }
        Ok(result.path)
    }

    /// Re-partition node `b`'s seating after `c` was spliced between `a`
    /// and `b`.
    fn handle_split(
        &mut self,
        a: PathNode,
        b: PathNode,
        c: PathNode,
    ) -> Result<(), ModelError> {
        let (parent, middle, child) = (a.len(), c.len(), b.len());
        if !(parent < middle && middle < child) {
            debug_assert!(
                false,
                "split lengths must nest: {parent} < {middle} < {child}"
            );
            return Err(ModelError::SplitContract {
                parent,
                middle,
                child,
            });
        }
        let discount_before = self.params.discount(parent, child);
        let discount_after = self.params.discount(middle, child);
        let (b_payload, c_payload) = self.tree.payload_pair_mut(b.id, c.id);
        self.restaurant.update_after_split(
            b_payload,
            c_payload,
            discount_before,
            discount_after,
            false,
            &mut self.rng,
        );
        Ok(())
    }

    /// Score and seat `symbol` at the empty context.
    pub fn insert_root(&mut self, symbol: Symbol) -> Result<(), ModelError> {
        self.check_symbol(symbol)?;
        let path = self.tree.find_longest_suffix(&self.seq, 0, 0);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        self.update_path(&path, &probs, &discounts, &concentrations, symbol);
        Ok(())
    }

    /// Insert context `[start, end)` (handling any split), then score and
    /// seat `symbol` on the resulting path. Returns the probability path.
    pub fn insert_context_and_observation(
        &mut self,
        start: usize,
        end: usize,
        symbol: Symbol,
    ) -> Result<Vec<f64>, ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        let path = self.insert_context(start, end)?;
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        let stats = self.level_stats(&path, symbol);
        self.params
            .accumulate_gradient(&path, &stats, &probs, &discounts, &concentrations);
        self.update_path(&path, &probs, &discounts, &concentrations, symbol);
        self.inserts_since_step += 1;
        if self.inserts_since_step >= self.config.gradient_every {
            self.params.step_gradient(self.config.gradient_step);
            self.inserts_since_step = 0;
        }
        Ok(probs)
    }

    /// Seat `symbol` under context `[start, end)` without touching the tree
    /// structure. `cached` skips the path lookup.
    pub fn insert_observation(
        &mut self,
        start: usize,
        end: usize,
        symbol: Symbol,
        cached: Option<&[PathNode]>,
    ) -> Result<Vec<f64>, ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        trace!(start, end, symbol, "insert observation");
        let path = match cached {
            Some(p) => p.to_vec(),
            None => self.tree.find_longest_suffix(&self.seq, start, end),
        };
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        self.update_path(&path, &probs, &discounts, &concentrations, symbol);
        Ok(probs)
    }

    /// Unseat one observation of `symbol` under context `[start, end)`.
    pub fn remove_observation(
        &mut self,
        start: usize,
        end: usize,
        symbol: Symbol,
        cached: Option<&[PathNode]>,
    ) -> Result<(), ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        trace!(start, end, symbol, "remove observation");
        let path = match cached {
            Some(p) => p.to_vec(),
            None => self.tree.find_longest_suffix(&self.seq, start, end),
        };
        let discounts = self.params.discounts(&path);
        self.remove_from_path(&path, &discounts, symbol);
        Ok(())
    }

    /// Per-symbol log-loss (bits) of `seq[start..end)`, seating each symbol
    /// as it is scored. The first symbol costs the base rate `log2 K`.
    pub fn compute_losses(&mut self, start: usize, end: usize) -> Result<Vec<f64>, ModelError> {
        if start >= end || end > self.seq.len() {
            return Err(ModelError::RangeOutOfBounds {
                start,
                end,
                len: self.seq.len(),
            });
        }
        let mut losses = Vec::with_capacity(end - start);
        losses.push((self.config.num_types as f64).log2());
        let first = self.seq[start];
        self.insert_root(first)?;
        for i in start + 1..end {
            let symbol = self.seq[i];
            let probs = self.insert_context_and_observation(start, i, symbol)?;
            losses.push(-probs.last().expect("non-empty probability path").log2());
        }
        Ok(losses)
    }

    /// As [`compute_losses`](Self::compute_losses), but after seating
    /// position `i`, the observation at `i - lag` is unseated, maintaining
    /// a sliding window of `lag` observations.
    pub fn compute_losses_with_deletion(
        &mut self,
        start: usize,
        end: usize,
        lag: usize,
    ) -> Result<Vec<f64>, ModelError> {
        if start >= end || end > self.seq.len() {
            return Err(ModelError::RangeOutOfBounds {
                start,
                end,
                len: self.seq.len(),
            });
        }
        let mut losses = Vec::with_capacity(end - start);
        losses.push((self.config.num_types as f64).log2());
        let first = self.seq[start];
        self.insert_root(first)?;
        for i in start + 1..end {
            let symbol = self.seq[i];
            let probs = self.insert_context_and_observation(start, i, symbol)?;
            losses.push(-probs.last().expect("non-empty probability path").log2());
            if i >= lag && i - lag >= start {
                let stale = i - lag;
                let path = self.tree.find_node(&self.seq, start, stale)?;
                let stale_symbol = self.seq[stale];
                self.remove_observation(start, stale, stale_symbol, Some(&path))?;
            }
        }
        Ok(losses)
    }

    /// Remove and re-insert each observation in `[start, end)` using its
    /// cached path. A diagnostic reseating sweep.
    pub fn remove_add_sweep(&mut self, start: usize, end: usize) -> Result<(), ModelError> {
        self.check_range(start, end)?;
        for i in start..end {
            let path = self.tree.find_node(&self.seq, start, i)?;
            let symbol = self.seq[i];
            self.remove_observation(start, i, symbol, Some(&path))?;
            self.insert_observation(start, i, symbol, Some(&path))?;
        }
        Ok(())
    }

    /// Build the context tree from scratch over `seq[0..stop)`.
    pub fn build_tree(&mut self, stop: usize) -> Result<(), ModelError> {
        if stop == 0 || stop > self.seq.len() {
            return Err(ModelError::RangeOutOfBounds {
                start: 0,
                end: stop,
                len: self.seq.len(),
            });
        }
        let first = self.seq[0];
        self.insert_root(first)?;
        for i in 1..stop {
            let symbol = self.seq[i];
            self.insert_context_and_observation(0, i, symbol)?;
        }
        Ok(())
    }

    /// Extend a built tree with observations at positions `[start, stop)`.
    pub fn update_tree(&mut self, start: usize, stop: usize) -> Result<(), ModelError> {
        self.check_range(start, stop)?;
        for i in start..stop {
            let symbol = self.seq[i];
            self.insert_context_and_observation(0, i, symbol)?;
        }
        Ok(())
    }

    /// Predictive probability of `symbol` after context `[start, end)`,
    /// using the longest suffix path that exists in the tree.
    pub fn predict(&self, start: usize, end: usize, symbol: Symbol) -> Result<f64, ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        let path = self.tree.find_longest_suffix(&self.seq, start, end);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        Ok(*probs.last().expect("non-empty probability path"))
    }

    /// Predictive probability from below any virtual split point.
    pub fn predict_below(
        &self,
        start: usize,
        end: usize,
        symbol: Symbol,
    ) -> Result<f64, ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        let (_, path) = self.tree.find_longest_suffix_virtual(&self.seq, start, end);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        Ok(*probs.last().expect("non-empty probability path"))
    }

    /// Predictive probability accounting for the restaurant a split would
    /// create: a transient payload is fragmented off the virtual leaf,
    /// scored, and discarded; no tree state is mutated.
    pub fn predict_with_fragmentation(
        &mut self,
        start: usize,
        end: usize,
        symbol: Symbol,
    ) -> Result<f64, ModelError> {
        self.check_symbol(symbol)?;
        self.check_range(start, end)?;
        let (split_offset, path) = self.tree.find_longest_suffix_virtual(&self.seq, start, end);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
        if split_offset == 0 {
            return Ok(*probs.last().expect("non-empty probability path"));
        }
        debug_assert!(path.len() >= 2, "a virtual split implies a parent node");
        let parent_len = path[path.len() - 2].len();
        let discount_fragmented = self.params.discount(parent_len, split_offset);
        let concentration_fragmented =
            self.params
                .concentration(discount_fragmented, parent_len, split_offset);
        let mut transient = R::Payload::default();
        let leaf = path.last().expect("non-empty path");
        self.restaurant.update_after_split(
            self.tree.payload_mut(leaf.id),
            &mut transient,
            *discounts.last().expect("non-empty discount path"),
            discount_fragmented,
            true,
            &mut self.rng,
        );
        Ok(self.restaurant.compute_probability(
            &transient,
            symbol,
            probs[probs.len() - 2],
            discount_fragmented,
            concentration_fragmented,
        ))
    }

    /// Predictive probability of each position in `[start, end)` given the
    /// positions before it, under the chosen semantics.
    pub fn predict_sequence(
        &mut self,
        start: usize,
        end: usize,
        mode: PredictMode,
    ) -> Result<Vec<f64>, ModelError> {
        self.check_range(start, end)?;
        let mut probs = Vec::with_capacity(end - start);
        for i in start..end {
            let symbol = self.seq[i];
            let p = match mode {
                PredictMode::Above => self.predict(start, i, symbol)?,
                PredictMode::Fragment => self.predict_with_fragmentation(start, i, symbol)?,
                PredictMode::Below => self.predict_below(start, i, symbol)?,
            };
            probs.push(p);
        }
        Ok(probs)
    }

    /// Full predictive distribution over the alphabet after context
    /// `[start, end)`.
    pub fn predictive_distribution(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<f64>, ModelError> {
        self.check_range(start, end)?;
        let path = self.tree.find_longest_suffix(&self.seq, start, end);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let mut predictive = Vec::with_capacity(self.config.num_types);
        for symbol in 0..self.config.num_types {
            let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
            predictive.push(*probs.last().expect("non-empty probability path"));
        }
        Ok(predictive)
    }

    /// Predictive distribution mixing the smoothed probabilities of the
    /// path levels with user-supplied weights: levels `j < |m|` contribute
    /// `m_j p_j` and the leaf takes the remaining mass.
    pub fn predictive_distribution_with_mixing(
        &self,
        start: usize,
        end: usize,
        mixing_weights: &[f64],
    ) -> Result<Vec<f64>, ModelError> {
        self.check_range(start, end)?;
        let path = self.tree.find_longest_suffix(&self.seq, start, end);
        let discounts = self.params.discounts(&path);
        let concentrations = self.params.concentrations(&path, &discounts);
        let mut predictive = Vec::with_capacity(self.config.num_types);
        for symbol in 0..self.config.num_types {
            let probs = self.probability_path(&path, &discounts, &concentrations, symbol);
            let mut mixed = 0.0;
            let mut weight_sum = 0.0;
            for (j, &m) in mixing_weights.iter().enumerate().take(probs.len()) {
                mixed += m * probs[j];
                weight_sum += m;
            }
            predictive.push(mixed + (1.0 - weight_sum) * probs.last().expect("non-empty probability path"));
        }
        Ok(predictive)
    }

    /// Counters at every level of a path for one symbol.
    pub(crate) fn level_stats(&self, path: &[PathNode], symbol: Symbol) -> Vec<LevelStats> {
        path.iter()
            .map(|node| {
                let payload = self.tree.payload(node.id);
                LevelStats {
                    cw: self.restaurant.customers_of(payload, symbol),
                    tw: self.restaurant.tables_of(payload, symbol),
                    c: self.restaurant.customers(payload),
                    t: self.restaurant.tables(payload),
                }
            })
            .collect()
    }

    /// Verify child-parent table/customer consistency and per-payload row
    /// sums over the whole tree.
    pub fn check_consistency(&self) -> bool {
        let mut consistent = true;
        self.tree.visit_with_children(|node, children| {
            let payload = self.tree.payload(node.id);
            let mut node_ok = self.restaurant.check_consistency(payload);
            let mut table_sums: std::collections::BTreeMap<Symbol, usize> = Default::default();
            for child in children {
                let child_payload = self.tree.payload(child.id);
                for symbol in self.restaurant.types(child_payload) {
                    *table_sums.entry(symbol).or_default() +=
                        self.restaurant.tables_of(child_payload, symbol);
                }
            }
            for (symbol, tables) in table_sums {
                node_ok &= self.restaurant.customers_of(payload, symbol) >= tables;
            }
            if !node_ok {
                warn!(
                    start = node.start,
                    end = node.end,
                    "inconsistent restaurant state"
                );
            }
            consistent &= node_ok;
        });
        consistent
    }

    /// Indented rendering of the context tree with per-node seating
    /// summaries.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.tree.visit(|node, depth| {
            let label: Vec<String> = self.seq[node.start..node.end]
                .iter()
                .map(|s| s.to_string())
                .collect();
            out.push_str(&" ".repeat(depth));
            out.push_str(&format!(
                "[{}] {}\n",
                label.join(" "),
                self.restaurant.describe(self.tree.payload(node.id))
            ));
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::GradientParameters;
    use crate::restaurant::seating::SeatingRestaurant;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    fn binary_model(discount: f64) -> HpypModel<SeatingRestaurant, GradientParameters> {
        HpypModel::new(
            SeatingRestaurant,
            GradientParameters::with_uniform_discount(discount),
            ModelConfig::new(2),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(ModelConfig::new(2).validate().is_ok());
        assert!(matches!(
            ModelConfig::new(1).validate(),
            Err(ModelError::InvalidAlphabetSize(1))
        ));
        let bad_cadence = ModelConfig {
            gradient_every: 0,
            ..ModelConfig::new(2)
        };
        assert!(bad_cadence.validate().is_err());
        let bad_step = ModelConfig {
            gradient_step: f64::NAN,
            ..ModelConfig::new(2)
        };
        assert!(bad_step.validate().is_err());
    }

    #[test]
    fn test_empty_model_predicts_the_base_rate() {
        let model = binary_model(0.5);
        assert_eq!(model.predict(0, 0, 0).unwrap(), 0.5);
        assert_eq!(model.predict(0, 0, 1).unwrap(), 0.5);
    }

    #[test]
    fn test_root_seating_shifts_the_predictive() {
        let mut model = binary_model(0.5);
        model.append(&[0]).unwrap();
        model.insert_root(0).unwrap();
        // (1 - 0.5)/1 + (0.5/1) * 0.5 = 0.75
        assert!(approx_eq(model.predict(0, 1, 0).unwrap(), 0.75, 1e-12));
        assert!(approx_eq(model.predict(0, 1, 1).unwrap(), 0.25, 1e-12));
    }

    #[test]
    fn test_symbol_and_range_validation() {
        let mut model = binary_model(0.5);
        model.append(&[0, 1]).unwrap();
        assert!(matches!(
            model.predict(0, 1, 9),
            Err(ModelError::SymbolOutOfRange { symbol: 9, .. })
        ));
        assert!(matches!(
            model.predict(0, 5, 0),
            Err(ModelError::RangeOutOfBounds { .. })
        ));
        assert!(model.append(&[7]).is_err());
    }

    #[test]
    fn test_losses_start_at_the_base_rate() {
        let mut model = binary_model(0.5);
        model.append(&[0, 0, 1, 0]).unwrap();
        let losses = model.compute_losses(0, 4).unwrap();
        assert_eq!(losses.len(), 4);
        assert!(approx_eq(losses[0], 1.0, 1e-12));
        assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
        assert!(model.check_consistency());
    }

    #[test]
    fn test_distribution_sums_to_one_everywhere() {
        let mut model = binary_model(0.5);
        model.append(&[0, 1, 0, 0, 1, 0, 1, 1]).unwrap();
        model.compute_losses(0, 8).unwrap();
        for end in 0..=8 {
            let dist = model.predictive_distribution(0, end).unwrap();
            let total: f64 = dist.iter().sum();
            assert!(approx_eq(total, 1.0, 1e-9), "end={end} total={total}");
            assert!(dist.iter().all(|p| *p > 0.0 && *p < 1.0));
        }
    }

    #[test]
    fn test_mixing_weights_interpolate_levels() {
        let mut model = binary_model(0.5);
        model.append(&[0, 0, 0, 0]).unwrap();
        model.compute_losses(0, 4).unwrap();
        // full weight on the base distribution recovers 1/K
        let dist = model
            .predictive_distribution_with_mixing(0, 3, &[1.0])
            .unwrap();
        assert!(approx_eq(dist[0], 0.5, 1e-12));
        // no weights fall back to the leaf predictive
        let plain = model.predictive_distribution(0, 3).unwrap();
        let unmixed = model
            .predictive_distribution_with_mixing(0, 3, &[])
            .unwrap();
        assert!(approx_eq(plain[0], unmixed[0], 1e-12));
    }

    #[test]
    fn test_build_tree_then_update_tree_extends() {
        let mut model = binary_model(0.5);
        model.append(&[0, 1, 0, 1, 0]).unwrap();
        model.build_tree(3).unwrap();
        let before = model.tree().node_count();
        model.update_tree(3, 5).unwrap();
        assert!(model.tree().node_count() >= before);
        assert!(model.check_consistency());
    }

    #[test]
    fn test_describe_renders_every_node() {
        let mut model = binary_model(0.5);
        model.append(&[0, 1, 0]).unwrap();
        model.compute_losses(0, 3).unwrap();
        let rendering = model.describe();
        assert_eq!(rendering.lines().count(), model.tree().node_count());
    }
}
