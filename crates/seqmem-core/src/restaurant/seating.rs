//! Full seating arrangements: per symbol, the explicit multiset of table
//! occupancies.
//!
//! This is the reference representation. Adding a customer samples a table
//! from the exact conditional seating law, removal evicts a uniformly chosen
//! customer, and split handling runs the fragmentation process table by
//! table, so every operation keeps the payload an exact draw from the
//! conditional seating posterior.

use std::collections::BTreeMap;

use super::{draw_new_table, predictive, AddRemoveRestaurant, Restaurant};
use crate::rng::SampleRng;
use crate::Symbol;

/// Seating state: one vector of table sizes per symbol, plus cached totals.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeatingPayload {
    arrangements: BTreeMap<Symbol, Vec<usize>>,
    customers: usize,
    tables: usize,
}

impl SeatingPayload {
    fn customers_of(&self, symbol: Symbol) -> usize {
        self.arrangements
            .get(&symbol)
            .map(|a| a.iter().sum())
            .unwrap_or(0)
    }

    fn tables_of(&self, symbol: Symbol) -> usize {
        self.arrangements.get(&symbol).map(Vec::len).unwrap_or(0)
    }
}

/// Strategy object for [`SeatingPayload`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SeatingRestaurant;

impl Restaurant for SeatingRestaurant {
    type Payload = SeatingPayload;
    type Aux = ();

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
        let arrangement = payload.arrangements.entry(symbol).or_default();
        if open {
            arrangement.push(1);
            payload.tables += 1;
        } else {
            let weights: Vec<f64> = arrangement
                .iter()
                .map(|&n| n as f64 - discount)
                .collect();
            let k = rng.sample_unnormalized_pdf(&weights, 0);
            arrangement[k] += 1;
        }
        payload.customers += 1;
        if open {
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
        payload.arrangements.keys().copied().collect()
    }

    fn check_consistency(&self, payload: &Self::Payload) -> bool {
        let mut customers = 0;
        let mut tables = 0;
        for arrangement in payload.arrangements.values() {
            if arrangement.is_empty() || arrangement.iter().any(|&n| n == 0) {
                return false;
            }
            customers += arrangement.iter().sum::<usize>();
            tables += arrangement.len();
        }
        customers == payload.customers && tables == payload.tables
    }

    fn describe(&self, payload: &Self::Payload) -> String {
        let per_type: Vec<String> = payload
            .arrangements
            .iter()
            .map(|(w, a)| {
                let sizes: Vec<String> = a.iter().map(|n| n.to_string()).collect();
                format!("{w}:[{}]", sizes.join(" "))
            })
            .collect();
        format!(
            "c={} t={} {{{}}}",
            payload.customers,
            payload.tables,
            per_type.join(", ")
        )
    }

    fn make_aux(&self, _payload: &Self::Payload, _discount: f64, _concentration: f64) {}
}

impl AddRemoveRestaurant for SeatingRestaurant {
    fn remove_customer(
        &self,
        payload: &mut Self::Payload,
        symbol: Symbol,
        _discount: f64,
        _aux: Option<&mut Self::Aux>,
        _fraction: f64,
        rng: &mut SampleRng,
    ) -> f64 {
        let cw = payload.customers_of(symbol);
        if cw == 0 {
            return 0.0;
        }
        let mut victim = rng.index(cw);
        let arrangement = payload
            .arrangements
            .get_mut(&symbol)
            .expect("cw > 0 implies an arrangement");
        let mut closed = false;
        for k in 0..arrangement.len() {
            if victim < arrangement[k] {
                arrangement[k] -= 1;
                if arrangement[k] == 0 {
                    arrangement.remove(k);
                    closed = true;
                }
                break;
            }
            victim -= arrangement[k];
        }
        if arrangement.is_empty() {
            payload.arrangements.remove(&symbol);
        }
        payload.customers -= 1;
        if closed {
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
        let mut replacement: BTreeMap<Symbol, Vec<usize>> = BTreeMap::new();
        for (&symbol, arrangement) in &longer.arrangements {
            let mut fine_tables = Vec::with_capacity(arrangement.len());
            let mut shorter_arrangement = Vec::with_capacity(arrangement.len());
            for &size in arrangement {
                // each old table keeps its identity as one table of the new
                // intermediate; its customers re-seat into the finer tables
                let fine = fragment_table(size, discount_before, discount_after, rng);
                shorter_arrangement.push(fine.len());
                fine_tables.extend(fine);
            }
            shorter.customers += fine_tables.len();
            shorter.tables += shorter_arrangement.len();
            shorter.arrangements.insert(symbol, shorter_arrangement);
            replacement.insert(symbol, fine_tables);
        }
        if !only_update_shorter {
            longer.tables = replacement.values().map(Vec::len).sum();
            longer.arrangements = replacement;
        }
    }
}

/// Re-partition one table of `size` customers by the fragmentation process:
/// a seating with concentration `-d_before` and discount `d_after`, the
/// conditional law of the finer seating given that the coarser process
/// coagulated it into a single table.
fn fragment_table(
    size: usize,
    d_before: f64,
    d_after: f64,
    rng: &mut SampleRng,
) -> Vec<usize> {
    let mut tables = vec![1usize];
    for seated in 1..size {
        let denom = seated as f64 - d_before;
        let open = (tables.len() as f64 * d_after - d_before) / denom;
        if rng.accept(open) {
            tables.push(1);
        } else {
            let weights: Vec<f64> = tables.iter().map(|&n| n as f64 - d_after).collect();
            let k = rng.sample_unnormalized_pdf(&weights, 0);
            tables[k] += 1;
        }
    }
    tables
}
