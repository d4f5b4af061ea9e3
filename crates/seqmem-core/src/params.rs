//! Discount and concentration parameters along context-tree paths.
//!
//! Parameters are keyed by context *length*: the store holds one base
//! discount per depth (the tail entry repeating for all deeper levels), and
//! a node's discount is the product of the base discounts over its depth
//! span. Products compose, `d(A, B) = d(A, C) · d(C, B)`, which is exactly
//! what the split handler needs to relate a node's discount before and
//! after an edge cut. Concentrations scale with the discount,
//! `α_node = α · d_node`, keeping `α_node > -d_node` for every span.
//!
//! The store also accumulates the gradient of the predictive log-likelihood
//! with respect to the base discounts, by backpropagating through the
//! smoothing recursion, and applies it on demand.

use serde::{Deserialize, Serialize};

use crate::tree::PathNode;

/// Per-level restaurant statistics the gradient needs: counters for the
/// observed symbol and the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStats {
    pub cw: usize,
    pub tw: usize,
    pub c: usize,
    pub t: usize,
}

/// Parameter store contract consumed by the model core.
pub trait Parameters {
    /// Discount for each level of a root-first path.
    fn discounts(&self, path: &[PathNode]) -> Vec<f64>;

    /// Concentration for each level, given the level discounts.
    fn concentrations(&self, path: &[PathNode], discounts: &[f64]) -> Vec<f64>;

    /// Discount of a node of context length `child_len` under a parent of
    /// length `parent_len`.
    fn discount(&self, parent_len: usize, child_len: usize) -> f64;

    /// Concentration for a node with the given discount and span.
    fn concentration(&self, discount: f64, parent_len: usize, child_len: usize) -> f64;

    /// Extend a discount-path prefix in place until it covers `path`.
    fn extend_discounts(&self, path: &[PathNode], discounts: &mut Vec<f64>);

    /// Extend a concentration-path prefix in place until it covers `path`.
    fn extend_concentrations(
        &self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &mut Vec<f64>,
    );

    /// Accumulate the gradient of `log p_L` for one observation.
    /// `stats[j]` holds level `j`'s counters and `probs` is the full
    /// probability path (length `stats.len() + 1`).
    fn accumulate_gradient(
        &mut self,
        path: &[PathNode],
        stats: &[LevelStats],
        probs: &[f64],
        discounts: &[f64],
        concentrations: &[f64],
    );

    /// Apply the accumulated gradient with step size `eta` and reset it.
    fn step_gradient(&mut self, eta: f64);
}

const DEFAULT_DISCOUNTS: [f64; 5] = [0.62, 0.69, 0.74, 0.80, 0.95];
const DISCOUNT_FLOOR: f64 = 1e-4;

/// Depth-indexed discounts with gradient updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientParameters {
    discounts: Vec<f64>,
    alpha: f64,
    #[serde(skip)]
    gradient: Vec<f64>,
}

impl GradientParameters {
    /// Create a store from per-depth base discounts; depths past the end of
    /// the vector reuse its last entry.
    pub fn new(discounts: Vec<f64>, alpha: f64) -> Self {
        assert!(!discounts.is_empty(), "at least one base discount required");
        assert!(
            discounts.iter().all(|d| (0.0..1.0).contains(d)),
            "discounts must lie in [0, 1)"
        );
        let gradient = vec![0.0; discounts.len()];
        Self {
            discounts,
            alpha,
            gradient,
        }
    }

    /// A store using one discount at every depth (handy for tests and small
    /// alphabets).
    pub fn with_uniform_discount(discount: f64) -> Self {
        Self::new(vec![discount], 0.0)
    }

    /// Current base discounts.
    pub fn base_discounts(&self) -> &[f64] {
        &self.discounts
    }

    fn base(&self, depth: usize) -> f64 {
        self.discounts[depth.min(self.discounts.len() - 1)]
    }

    /// Product of base discounts over the depth span of one node; the root
    /// (empty span) takes the depth-0 discount itself.
    fn span_discount(&self, parent_len: usize, child_len: usize) -> f64 {
        if parent_len == child_len {
            return self.base(0);
        }
        (parent_len + 1..=child_len).map(|d| self.base(d)).product()
    }

    fn span_indices(&self, parent_len: usize, child_len: usize) -> Vec<usize> {
        if parent_len == child_len {
            return vec![0];
        }
        (parent_len + 1..=child_len)
            .map(|d| d.min(self.discounts.len() - 1))
            .collect()
    }
}

impl Default for GradientParameters {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOUNTS.to_vec(), 0.0)
    }
}

impl Parameters for GradientParameters {
    fn discounts(&self, path: &[PathNode]) -> Vec<f64> {
        let mut out = Vec::with_capacity(path.len());
        self.extend_discounts(path, &mut out);
        out
    }

    fn concentrations(&self, path: &[PathNode], discounts: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(path.len());
        self.extend_concentrations(path, discounts, &mut out);
        out
    }

    fn discount(&self, parent_len: usize, child_len: usize) -> f64 {
        self.span_discount(parent_len, child_len)
    }

    fn concentration(&self, discount: f64, _parent_len: usize, _child_len: usize) -> f64 {
        self.alpha * discount
    }

    fn extend_discounts(&self, path: &[PathNode], discounts: &mut Vec<f64>) {
        while discounts.len() < path.len() {
            let j = discounts.len();
            let parent_len = if j == 0 { 0 } else { path[j - 1].len() };
            discounts.push(self.span_discount(parent_len, path[j].len()));
        }
    }

    fn extend_concentrations(
        &self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &mut Vec<f64>,
    ) {
        while concentrations.len() < path.len() {
            let j = concentrations.len();
            let parent_len = if j == 0 { 0 } else { path[j - 1].len() };
            concentrations.push(self.concentration(discounts[j], parent_len, path[j].len()));
        }
    }

    fn accumulate_gradient(
        &mut self,
        path: &[PathNode],
        stats: &[LevelStats],
        probs: &[f64],
        discounts: &[f64],
        concentrations: &[f64],
    ) {
        debug_assert_eq!(stats.len(), path.len());
        debug_assert_eq!(probs.len(), path.len() + 1);
        let levels = stats.len();
        let final_prob = probs[levels];
        if !(final_prob > 0.0) {
            return;
        }
        // backpropagate d log p_L through p_{j+1} = f(p_j, d_j)
        let mut chain = 1.0 / final_prob;
        let mut grad_levels = vec![0.0; levels];
        for j in (0..levels).rev() {
            let s = &stats[j];
            if s.c == 0 {
                continue; // p_{j+1} = p_j, nothing to differentiate
            }
            let d = discounts[j];
            let a = concentrations[j];
            let denom = a + s.c as f64;
            let num = s.cw as f64 - d * s.tw as f64;
            let smooth = a + d * s.t as f64;
            // alpha_j = alpha * d_j, so da/dd folds into the derivative
            let da = self.alpha;
            let dp_dd = (-(s.tw as f64) - num * da / denom
                + probs[j] * (s.t as f64 + da - smooth * da / denom))
                / denom;
            grad_levels[j] = chain * dp_dd;
            chain *= smooth / denom;
        }
        for j in 0..levels {
            if grad_levels[j] == 0.0 {
                continue;
            }
            let parent_len = if j == 0 { 0 } else { path[j - 1].len() };
            for k in self.span_indices(parent_len, path[j].len()) {
                // d(span)/d(base_k) = span * multiplicity / base_k,
                // accumulated one depth at a time
                self.gradient[k] += grad_levels[j] * discounts[j] / self.discounts[k];
            }
        }
    }

    fn step_gradient(&mut self, eta: f64) {
        for (d, g) in self.discounts.iter_mut().zip(self.gradient.iter_mut()) {
            *d = (*d + eta * *g).clamp(DISCOUNT_FLOOR, 1.0 - DISCOUNT_FLOOR);
            *g = 0.0;
        }
    }
}
