//! Gibbs samplers over the latent seating structure.
//!
//! Both samplers iterate the tree one root-first path at a time in DFS
//! order, keeping the per-level discounts, concentrations, and auxiliary
//! data in sync incrementally: a step to a new path truncates the caches to
//! the shared path prefix and extends them through the parameter store.
//!
//! The add/remove sampler reseats each customer of the leaf restaurant by
//! unseating it (ascending while tables close), recomputing the smoothed
//! probabilities below the stop level, and reseating it leaf-up. The direct
//! sampler instead resamples the per-type table count jointly with the
//! parent's customer count from its marginal law, using log-domain Stirling
//! weights; each weight component is shifted by its own maximum before the
//! sum is exponentiated.

use seqmem_math::{exp_in_place, log_rising_factorial, shift_by_max};
use tracing::trace;

use crate::model::HpypModel;
use crate::params::Parameters;
use crate::restaurant::{AddRemoveRestaurant, CompactRestaurant, Restaurant, StirlingAccess};
use crate::tree::{ContextTree, PathNode};

/// Per-level caches for one DFS sweep.
struct PathCache<A> {
    discounts: Vec<f64>,
    concentrations: Vec<f64>,
    aux: Vec<A>,
}

impl<A> PathCache<A> {
    fn new() -> Self {
        Self {
            discounts: Vec::new(),
            concentrations: Vec::new(),
            aux: Vec::new(),
        }
    }

    /// Truncate to the prefix shared with the previous path, then extend to
    /// cover the new one.
    fn rebuild<R, P>(
        &mut self,
        restaurant: &R,
        params: &P,
        tree: &ContextTree<R::Payload>,
        prev: &[PathNode],
        path: &[PathNode],
    ) where
        R: Restaurant<Aux = A>,
        P: Parameters,
    {
        let mut keep = 0;
        while keep < prev.len().min(path.len()) && prev[keep].id == path[keep].id {
            keep += 1;
        }
        self.discounts.truncate(keep);
        self.concentrations.truncate(keep);
        self.aux.truncate(keep);
        params.extend_discounts(path, &mut self.discounts);
        params.extend_concentrations(path, &self.discounts, &mut self.concentrations);
        for j in self.aux.len()..path.len() {
            self.aux.push(restaurant.make_aux(
                tree.payload(path[j].id),
                self.discounts[j],
                self.concentrations[j],
            ));
        }
    }
}

impl<R: AddRemoveRestaurant, P: Parameters> HpypModel<R, P> {
    /// One add/remove Gibbs sweep: reseat every customer of every
    /// restaurant in the tree.
    pub fn gibbs_sweep_add_remove(&mut self) {
        let mut dfs = self.tree.dfs_paths();
        let mut cache = PathCache::new();
        let mut prev: Vec<PathNode> = Vec::new();
        while let Some(path) = dfs.next(&self.tree) {
            cache.rebuild(&self.restaurant, &self.params, &self.tree, &prev, &path);
            trace!(depth = path.len(), "add/remove sampling path");
            self.add_remove_sample_path(&path, &cache.discounts, &cache.concentrations, &mut cache.aux);
            prev = path;
        }
    }

    fn add_remove_sample_path(
        &mut self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &[f64],
        aux: &mut [R::Aux],
    ) {
        debug_assert!(!path.is_empty());
        debug_assert_eq!(path.len(), discounts.len());
        debug_assert_eq!(path.len(), concentrations.len());
        let leaf = path.last().expect("non-empty path").id;
        for symbol in self.restaurant.types(self.tree.payload(leaf)) {
            let cw = self.restaurant.customers_of(self.tree.payload(leaf), symbol);
            if cw <= 1 {
                continue; // a one-customer restaurant is deterministic
            }
            let mut probs = self.probability_path(path, discounts, concentrations, symbol);
            for _ in 0..cw {
                // unseat, ascending while tables close
                let mut level = path.len() as isize - 1;
                while level >= 0 {
                    let j = level as usize;
                    let closed = self.restaurant.remove_customer(
                        self.tree.payload_mut(path[j].id),
                        symbol,
                        discounts[j],
                        Some(&mut aux[j]),
                        1.0,
                        &mut self.rng,
                    );
                    if closed > 0.0 {
                        level -= 1;
                    } else {
                        break;
                    }
                }
                // every level at and below the stop changed; recompute the
                // smoothed probabilities downward (the base entry is fixed)
                for j in level.max(0) as usize..path.len() {
                    probs[j + 1] = self.restaurant.compute_probability(
                        self.tree.payload(path[j].id),
                        symbol,
                        probs[j],
                        discounts[j],
                        concentrations[j],
                    );
                }
                // reseat, ascending while new tables open
                let mut level = path.len() as isize - 1;
                while level >= 0 {
                    let j = level as usize;
                    let opened = self.restaurant.add_customer(
                        self.tree.payload_mut(path[j].id),
                        symbol,
                        probs[j],
                        discounts[j],
                        concentrations[j],
                        1.0,
                        &mut self.rng,
                    );
                    if opened > 0.0 {
                        level -= 1;
                    } else {
                        break;
                    }
                }
            }
        }
    }

    /// Log probability of the current seating configuration under the
    /// hierarchical prior. Used as a sampler sanity check.
    pub fn log_joint(&mut self) -> f64
    where
        R::Aux: StirlingAccess,
    {
        let mut dfs = self.tree.dfs_paths();
        let mut cache = PathCache::new();
        let mut prev: Vec<PathNode> = Vec::new();
        let mut total = 0.0;
        while let Some(path) = dfs.next(&self.tree) {
            cache.rebuild(&self.restaurant, &self.params, &self.tree, &prev, &path);
            total += self.path_log_prob(&path, &cache.discounts, &cache.concentrations, &mut cache.aux);
            prev = path;
        }
        total
    }

    fn path_log_prob(
        &self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &[f64],
        aux: &mut [R::Aux],
    ) -> f64
    where
        R::Aux: StirlingAccess,
    {
        let leaf = path.last().expect("non-empty path").id;
        let payload = self.tree.payload(leaf);
        let customers = self.restaurant.customers(payload);
        if customers <= 1 {
            return 0.0; // deterministic restaurant
        }
        let tables = self.restaurant.tables(payload);
        let j = path.len() - 1;
        let mut lp = log_rising_factorial(concentrations[j] + discounts[j], discounts[j], tables - 1)
            - log_rising_factorial(concentrations[j] + 1.0, 1.0, customers - 1);
        for symbol in self.restaurant.types(payload) {
            let cw = self.restaurant.customers_of(payload, symbol);
            let tw = self.restaurant.tables_of(payload, symbol);
            lp += aux[j].log_stirling(cw, tw);
            if j == 0 {
                // the root's tables draw from the base distribution
                lp += tw as f64 * self.base_prob.ln();
            }
        }
        lp
    }
}

impl<R, P> HpypModel<R, P>
where
    R: CompactRestaurant,
    R::Aux: StirlingAccess,
    P: Parameters,
{
    /// One direct Gibbs sweep: resample every per-type table count jointly
    /// with its parent's customer count.
    pub fn gibbs_sweep_direct(&mut self) {
        let mut dfs = self.tree.dfs_paths();
        let mut cache = PathCache::new();
        let mut prev: Vec<PathNode> = Vec::new();
        while let Some(path) = dfs.next(&self.tree) {
            cache.rebuild(&self.restaurant, &self.params, &self.tree, &prev, &path);
            trace!(depth = path.len(), "direct sampling path");
            self.direct_sample_path(&path, &cache.discounts, &cache.concentrations, &mut cache.aux);
            prev = path;
        }
    }

    fn direct_sample_path(
        &mut self,
        path: &[PathNode],
        discounts: &[f64],
        concentrations: &[f64],
        aux: &mut [R::Aux],
    ) {
        debug_assert!(!path.is_empty());
        debug_assert_eq!(path.len(), discounts.len());
        let leaf = path.last().expect("non-empty path").id;
        for symbol in self.restaurant.types(self.tree.payload(leaf)) {
            if self.restaurant.customers_of(self.tree.payload(leaf), symbol) <= 1 {
                continue;
            }
            let mut j = path.len() - 1;
            loop {
                let cur = path[j].id;
                let payload = self.tree.payload(cur);
                let cur_cw = self.restaurant.customers_of(payload, symbol);
                let cur_tw = self.restaurant.tables_of(payload, symbol);
                if cur_cw == 0 {
                    break;
                }
                let other_t = self.restaurant.tables(payload) - cur_tw;
                let weights = if j > 0 {
                    let parent = self.tree.payload(path[j - 1].id);
                    let parent_cw = self.restaurant.customers_of(parent, symbol);
                    let parent_tw = self.restaurant.tables_of(parent, symbol);
                    let parent_other_c = self.restaurant.customers(parent) - cur_tw;
                    debug_assert!(parent_cw >= cur_tw);
                    let (head, tail) = aux.split_at_mut(j);
                    interior_table_weights(
                        cur_cw,
                        other_t,
                        parent_cw - cur_tw,
                        parent_tw,
                        parent_other_c,
                        discounts[j],
                        concentrations[j],
                        concentrations[j - 1],
                        &mut tail[0],
                        &mut head[j - 1],
                    )
                } else {
                    root_table_weights(
                        cur_cw,
                        other_t,
                        discounts[0],
                        concentrations[0],
                        self.base_prob,
                        &mut aux[0],
                    )
                };
                let sampled = self.rng.sample_unnormalized_pdf(&weights, 0) + 1;
                self.restaurant
                    .set_tables(self.tree.payload_mut(cur), symbol, sampled);
                if j > 0 {
                    let parent_id = path[j - 1].id;
                    let new_cw = self
                        .restaurant
                        .customers_of(self.tree.payload(parent_id), symbol)
                        - cur_tw
                        + sampled;
                    debug_assert!(
                        new_cw
                            >= self
                                .restaurant
                                .tables_of(self.tree.payload(parent_id), symbol)
                    );
                    self.restaurant
                        .set_customers(self.tree.payload_mut(parent_id), symbol, new_cw);
                }
                if sampled == cur_tw || j == 0 {
                    break;
                }
                j -= 1;
            }
        }
    }
}

/// Unnormalized weights over the candidate table counts `t = 1..=cw` at an
/// interior level: the seating prior of this level, the parent's customer
/// normalizer, and the two Stirling marginals. Parent quantities already
/// exclude this level's current tables.
#[allow(clippy::too_many_arguments)]
fn interior_table_weights<A: StirlingAccess>(
    cw: usize,
    other_t: usize,
    parent_cw_less_tables: usize,
    parent_tw: usize,
    parent_other_c: usize,
    discount: f64,
    concentration: f64,
    parent_concentration: f64,
    aux: &mut A,
    parent_aux: &mut A,
) -> Vec<f64> {
    let mut prior = vec![0.0; cw];
    let mut normalizer = vec![0.0; cw];
    let mut stirling = vec![0.0; cw];
    let mut parent_stirling = vec![0.0; cw];
    let mut acc_prior = log_rising_factorial(concentration + discount, discount, other_t);
    let mut acc_norm = -log_rising_factorial(parent_concentration + 1.0, 1.0, parent_other_c);
    for t in 1..=cw {
        if t > 1 {
            acc_prior += (concentration + (other_t + t - 1) as f64 * discount).ln();
            acc_norm -= (parent_concentration + (parent_other_c + t - 1) as f64).ln();
        }
        let new_parent_cw = parent_cw_less_tables + t;
        if new_parent_cw < parent_tw {
            // the parent cannot hold fewer customers than tables
            parent_stirling[t - 1] = f64::NEG_INFINITY;
            continue;
        }
        prior[t - 1] = acc_prior;
        normalizer[t - 1] = acc_norm;
        stirling[t - 1] = aux.log_stirling(cw, t);
        parent_stirling[t - 1] = parent_aux.log_stirling(new_parent_cw, parent_tw);
    }
    finalize_weights(&mut [prior, normalizer, stirling, parent_stirling])
}

/// Root-level weights: the Stirling marginal takes the normalizer's place
/// and the base distribution supplies one factor per table.
fn root_table_weights<A: StirlingAccess>(
    cw: usize,
    other_t: usize,
    discount: f64,
    concentration: f64,
    base_prob: f64,
    aux: &mut A,
) -> Vec<f64> {
    let mut prior = vec![0.0; cw];
    let mut stirling = vec![0.0; cw];
    let mut base = vec![0.0; cw];
    let mut acc_prior = log_rising_factorial(concentration + discount, discount, other_t);
    let log_base = base_prob.ln();
    for t in 1..=cw {
        if t > 1 {
            acc_prior += (concentration + (other_t + t - 1) as f64 * discount).ln();
        }
        prior[t - 1] = acc_prior;
        stirling[t - 1] = aux.log_stirling(cw, t);
        base[t - 1] = t as f64 * log_base;
    }
    finalize_weights(&mut [prior, stirling, base])
}

/// Shift each component by its own maximum, sum, shift again, and
/// exponentiate.
fn finalize_weights(parts: &mut [Vec<f64>]) -> Vec<f64> {
    let len = parts[0].len();
    let mut total = vec![0.0; len];
    for part in parts.iter_mut() {
        shift_by_max(part);
        for (acc, v) in total.iter_mut().zip(part.iter()) {
            *acc += v;
        }
    }
    shift_by_max(&mut total);
    exp_in_place(&mut total);
    total
}
