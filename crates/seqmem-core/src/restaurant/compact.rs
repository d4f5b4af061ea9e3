//! Compact counter representation: per symbol only `(c_w, t_w)`.
//!
//! The explicit seating arrangement is marginalized out. Operations that
//! would need it (removal, split re-partitioning) instead sample from the
//! exact arrangement-marginal laws, which are ratios of generalized
//! Stirling numbers:
//!
//! - Removing an exchangeable customer closes a table with probability
//!   `S_d(c-1, t-1) / S_d(c, t)` (the recurrence splits arrangements by
//!   whether the last customer sat alone).
//! - A split resamples the fine table count `K` from
//!   `P(K) ∝ d_after^{K-1} · S_{d_after}(c, K) · S_{d_frag}(K, t)`,
//!   the conditional of the two-level seating given the coarse counts.
//!
//! The direct Gibbs sampler drives this representation through
//! [`CompactRestaurant`] writes and a per-level [`StirlingTable`] auxiliary.

use std::collections::BTreeMap;

use seqmem_math::{exp_in_place, shift_by_max, StirlingTable};

use super::{draw_new_table, predictive, AddRemoveRestaurant, CompactRestaurant, Restaurant};
use crate::rng::SampleRng;
use crate::Symbol;

/// Counter-only seating state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CountPayload {
    customers_by_type: BTreeMap<Symbol, usize>,
    tables_by_type: BTreeMap<Symbol, usize>,
    customers: usize,
    tables: usize,
}

impl CountPayload {
    fn customers_of(&self, symbol: Symbol) -> usize {
        self.customers_by_type.get(&symbol).copied().unwrap_or(0)
    }

    fn tables_of(&self, symbol: Symbol) -> usize {
        self.tables_by_type.get(&symbol).copied().unwrap_or(0)
    }

    fn set_entry(map: &mut BTreeMap<Symbol, usize>, symbol: Symbol, value: usize) -> isize {
        let old = if value == 0 {
            map.remove(&symbol).unwrap_or(0)
        } else {
            map.insert(symbol, value).unwrap_or(0)
        };
        value as isize - old as isize
    }
}

/// Strategy object for [`CountPayload`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CountRestaurant;

impl Restaurant for CountRestaurant {
    type Payload = CountPayload;
    type Aux = StirlingTable;

    fn compute_probability(
        &self,
        payload: &Self::Payload,
        symbol: Symbol,
        parent_prob: f64,
        discount: f64,
        concentration: f64,
    ) -> f64 {
        predictive(
            payload.customers_of(symbol),
            payload.tables_of(symbol),
            payload.customers,
            payload.tables,
            discount,
            concentration,
            parent_prob,
        )
    }

    fn add_customer(
        &self,
        payload: &mut Self::Payload,
        symbol: Symbol,
        parent_prob: f64,
        discount: f64,
        concentration: f64,
        _fraction: f64,
        rng: &mut SampleRng,
    ) -> f64 {
        let cw = payload.customers_of(symbol);
        let tw = payload.tables_of(symbol);
        let open = draw_new_table(
            cw,
            tw,
            payload.tables,
            discount,
            concentration,
            parent_prob,
            rng,
        );
        payload.customers_by_type.insert(symbol, cw + 1);
        payload.customers += 1;
        if open {
            payload.tables_by_type.insert(symbol, tw + 1);
            payload.tables += 1;
            1.0
        } else {
            0.0
        }
    }

    fn customers(&self, payload: &Self::Payload) -> usize {
        payload.customers
    }

    fn tables(&self, payload: &Self::Payload) -> usize {
        payload.tables
    }

    fn customers_of(&self, payload: &Self::Payload, symbol: Symbol) -> usize {
        payload.customers_of(symbol)
    }

    fn tables_of(&self, payload: &Self::Payload, symbol: Symbol) -> usize {
        payload.tables_of(symbol)
    }

    fn types(&self, payload: &Self::Payload) -> Vec<Symbol> {
        payload.customers_by_type.keys().copied().collect()
    }

    fn check_consistency(&self, payload: &Self::Payload) -> bool {
        let mut customers = 0;
        let mut tables = 0;
        for (symbol, &cw) in &payload.customers_by_type {
            let tw = payload.tables_of(*symbol);
            if cw == 0 || tw == 0 || tw > cw {
                return false;
            }
            customers += cw;
            tables += tw;
        }
        // no tables without customers
        if payload
            .tables_by_type
            .keys()
            .any(|w| payload.customers_of(*w) == 0)
        {
            return false;
        }
        customers == payload.customers && tables == payload.tables
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let per_type: Vec<String> = payload
            .customers_by_type
            .iter()
            .map(|(w, cw)| format!("{w}:{}/{}", cw, payload.tables_of(*w)))
            .collect();
        format!(
            "c={} t={} {{{}}}",
            payload.customers,
            payload.tables,
            per_type.join(", ")
        )
    }

    fn make_aux(
        &self,
        payload: &Self::Payload,
        discount: f64,
        _concentration: f64,
    ) -> Self::Aux {
        let rows = payload
            .customers_by_type
            .values()
            .copied()
            .max()
            .unwrap_or(0);
        StirlingTable::with_capacity(discount, rows)
    }
}

impl AddRemoveRestaurant for CountRestaurant {
    fn remove_customer(
        &self,
        payload: &mut Self::Payload,
        symbol: Symbol,
        discount: f64,
        aux: Option<&mut Self::Aux>,
        _fraction: f64,
        rng: &mut SampleRng,
    ) -> f64 {
        let cw = payload.customers_of(symbol);
        if cw == 0 {
            return 0.0;
        }
        let tw = payload.tables_of(symbol);
        let mut local = None;
        let table = match aux {
            Some(t) => t,
            None => local.insert(StirlingTable::new(discount)),
        };
        let log_close = table.log_stirling(cw - 1, tw - 1) - table.log_stirling(cw, tw);
        let close = rng.accept(log_close.exp());
        CountPayload::set_entry(&mut payload.customers_by_type, symbol, cw - 1);
        payload.customers -= 1;
        if close {
            CountPayload::set_entry(&mut payload.tables_by_type, symbol, tw - 1);
            payload.tables -= 1;
            1.0
        } else {
            0.0
        }
    }

    fn update_after_split(
        &self,
        longer: &mut Self::Payload,
        shorter: &mut Self::Payload,
        discount_before: f64,
        discount_after: f64,
        only_update_shorter: bool,
        rng: &mut SampleRng,
    ) {
        let d_frag = if discount_after > 0.0 {
            discount_before / discount_after
        } else {
            0.0
        };
        let mut fine = StirlingTable::new(discount_after);
        let mut coarse = StirlingTable::new(d_frag);
        let updates: Vec<(Symbol, usize, usize)> = longer
            .customers_by_type
            .iter()
            .map(|(&symbol, &cw)| {
                let tw = longer.tables_of(symbol);
                let k = sample_fine_table_count(
                    cw,
                    tw,
                    discount_after,
                    &mut fine,
                    &mut coarse,
                    rng,
                );
                (symbol, tw, k)
            })
            .collect();
        for (symbol, old_tw, k) in updates {
            let new_cw = shorter.customers_of(symbol) + k;
            let delta = CountPayload::set_entry(&mut shorter.customers_by_type, symbol, new_cw);
            shorter.customers = (shorter.customers as isize + delta) as usize;
            let new_tw = shorter.tables_of(symbol) + old_tw;
            let delta = CountPayload::set_entry(&mut shorter.tables_by_type, symbol, new_tw);
            shorter.tables = (shorter.tables as isize + delta) as usize;
            if !only_update_shorter {
                let delta = CountPayload::set_entry(&mut longer.tables_by_type, symbol, k);
                longer.tables = (longer.tables as isize + delta) as usize;
            }
        }
    }
}

impl CompactRestaurant for CountRestaurant {
    fn set_customers(&self, payload: &mut Self::Payload, symbol: Symbol, customers: usize) {
        let delta = CountPayload::set_entry(&mut payload.customers_by_type, symbol, customers);
        payload.customers = (payload.customers as isize + delta) as usize;
    }

    fn set_tables(&self, payload: &mut Self::Payload, symbol: Symbol, tables: usize) {
        let delta = CountPayload::set_entry(&mut payload.tables_by_type, symbol, tables);
        payload.tables = (payload.tables as isize + delta) as usize;
    }
}

/// Sample the number of fine tables `K` a split re-partitions `cw`
/// customers into, given that the coarse seating holds `tw` tables.
fn sample_fine_table_count(
    cw: usize,
    tw: usize,
    discount_after: f64,
    fine: &mut StirlingTable,
    coarse: &mut StirlingTable,
    rng: &mut SampleRng,
) -> usize {
    debug_assert!(tw >= 1 && tw <= cw);
    if tw == cw {
        return cw;
    }
    let mut weights: Vec<f64> = (tw..=cw)
        .map(|k| {
            let spread = if discount_after > 0.0 {
                (k as f64 - 1.0) * discount_after.ln()
            } else if k == 1 {
                0.0
            } else {
                f64::NEG_INFINITY
            };
            spread + fine.log_stirling(cw, k) + coarse.log_stirling(k, tw)
        })
        .collect();
    shift_by_max(&mut weights);
    exp_in_place(&mut weights);
    tw + rng.sample_unnormalized_pdf(&weights, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_counters_track_seating() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(2);
        let mut payload = CountPayload::default();
        for _ in 0..20 {
            r.add_customer(&mut payload, 5, 0.5, 0.5, 0.0, 1.0, &mut rng);
        }
        assert_eq!(r.customers_of(&payload, 5), 20);
        let tw = r.tables_of(&payload, 5);
        assert!(tw >= 1 && tw <= 20);
        assert!(r.check_consistency(&payload));
    }

    #[test]
    fn test_predictive_agrees_with_seating_representation() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(0);
        let mut payload = CountPayload::default();
        r.add_customer(&mut payload, 0, 0.5, 0.5, 0.0, 1.0, &mut rng);
        assert!(approx_eq(
            r.compute_probability(&payload, 0, 0.5, 0.5, 0.0),
            0.75,
            1e-12
        ));
    }

    #[test]
    fn test_single_customer_removal_always_closes() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(4);
        let mut payload = CountPayload::default();
        r.add_customer(&mut payload, 1, 0.5, 0.5, 0.0, 1.0, &mut rng);
        let closed = r.remove_customer(&mut payload, 1, 0.5, None, 1.0, &mut rng);
        assert_eq!(closed, 1.0);
        assert_eq!(r.customers(&payload), 0);
        assert_eq!(r.tables(&payload), 0);
    }

    #[test]
    fn test_removal_never_closes_the_only_table_early() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(6);
        let mut payload = CountPayload::default();
        // force a 10-customer single-table state
        r.add_customer(&mut payload, 0, 1.0, 0.0, 1.0, 1.0, &mut rng);
        r.set_customers(&mut payload, 0, 10);
        let closed = r.remove_customer(&mut payload, 0, 0.5, None, 1.0, &mut rng);
        assert_eq!(closed, 0.0, "a shared table survives removal");
        assert_eq!(r.customers_of(&payload, 0), 9);
        assert_eq!(r.tables_of(&payload, 0), 1);
    }

    #[test]
    fn test_add_remove_round_trip_empties_the_payload() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(8);
        let mut payload = CountPayload::default();
        for i in 0..40 {
            r.add_customer(&mut payload, i % 2, 0.4, 0.7, 0.2, 1.0, &mut rng);
        }
        for i in (0..40).rev() {
            r.remove_customer(&mut payload, i % 2, 0.7, None, 1.0, &mut rng);
        }
        assert_eq!(r.customers(&payload), 0);
        assert_eq!(r.tables(&payload), 0);
        assert!(r.types(&payload).is_empty());
    }

    #[test]
    fn test_set_counters_maintain_totals() {
        let r = CountRestaurant;
        let mut payload = CountPayload::default();
        r.set_customers(&mut payload, 0, 5);
        r.set_tables(&mut payload, 0, 2);
        r.set_customers(&mut payload, 1, 3);
        r.set_tables(&mut payload, 1, 3);
        assert_eq!(r.customers(&payload), 8);
        assert_eq!(r.tables(&payload), 5);
        r.set_customers(&mut payload, 1, 4);
        assert_eq!(r.customers(&payload), 9);
        assert!(r.check_consistency(&payload));
    }

    #[test]
    fn test_split_preserves_coarse_tables() {
        let r = CountRestaurant;
        let mut rng = SampleRng::from_seed(12);
        let mut longer = CountPayload::default();
        for _ in 0..50 {
            r.add_customer(&mut longer, 2, 0.4, 0.48, 0.0, 1.0, &mut rng);
        }
        let old_tw = r.tables_of(&longer, 2);
        let mut shorter = CountPayload::default();
        r.update_after_split(&mut longer, &mut shorter, 0.48, 0.8, false, &mut rng);

        // the intermediate's tables are exactly the old tables
        assert_eq!(r.tables_of(&shorter, 2), old_tw);
        // its customers are the split node's new tables
        assert_eq!(r.customers_of(&shorter, 2), r.tables_of(&longer, 2));
        // the fine seating refines the coarse one
        assert!(r.tables_of(&longer, 2) >= old_tw);
        assert!(r.tables_of(&longer, 2) <= r.customers_of(&longer, 2));
        assert_eq!(r.customers_of(&longer, 2), 50);
        assert!(r.check_consistency(&longer));
        assert!(r.check_consistency(&shorter));
    }

    #[test]
    fn test_fine_count_bounds() {
        let mut rng = SampleRng::from_seed(3);
        let mut fine = StirlingTable::new(0.8);
        let mut coarse = StirlingTable::new(0.6);
        for &(cw, tw) in &[(10usize, 3usize), (5, 1), (7, 7), (12, 2)] {
            let k = sample_fine_table_count(cw, tw, 0.8, &mut fine, &mut coarse, &mut rng);
            assert!(k >= tw && k <= cw, "cw={cw} tw={tw} k={k}");
        }
    }
}
