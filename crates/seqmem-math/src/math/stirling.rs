//! Generalized Stirling numbers for Pitman-Yor seating marginals.
//!
//! For discount `d`, the generalized Stirling number of the first kind
//! counts seating arrangements of `c` customers at `t` unlabeled tables,
//! weighted by the Pitman-Yor arrangement prior:
//!
//! ```text
//! S_d(c, t) = sum over partitions of [c] into t blocks of
//!             prod_b (1 - d)(2 - d)...(|b| - 1 - d)
//! ```
//!
//! with the triangular recurrence
//!
//! ```text
//! S_d(c, t) = S_d(c-1, t-1) + (c - 1 - d*t) * S_d(c-1, t)
//! ```
//!
//! (the new customer either opens table `t` or joins one of the existing
//! ones). Magnitudes explode factorially, so the table is kept in log
//! space and rows are combined with `log_add_exp`.
//!
//! A table is bound to a single discount for its whole life; callers that
//! sweep a parameter path create one table per level.

use crate::math::stable::log_add_exp;

/// Growable log-domain table of `S_d(c, t)` for one fixed discount.
#[derive(Debug, Clone)]
pub struct StirlingTable {
    discount: f64,
    /// `rows[n - 1][t - 1]` holds `log S_d(n, t)` for `1 <= t <= n`.
    rows: Vec<Vec<f64>>,
}

impl StirlingTable {
    /// Create an empty table for the given discount.
    pub fn new(discount: f64) -> Self {
        Self {
            discount,
            rows: Vec::new(),
        }
    }

    /// Create a table with rows for up to `customers` precomputed.
    pub fn with_capacity(discount: f64, customers: usize) -> Self {
        let mut table = Self::new(discount);
        table.grow_to(customers);
        table
    }

    /// The discount this table is bound to.
    pub fn discount(&self) -> f64 {
        self.discount
    }

    /// `log S_d(c, t)`.
    ///
    /// Out-of-range pairs (`t = 0` with `c > 0`, or `t > c`) have zero
    /// arrangements and return NEG_INFINITY; `c = t = 0` returns 0 (the
    /// empty arrangement).
    pub fn log_stirling(&mut self, c: usize, t: usize) -> f64 {
        if c == 0 && t == 0 {
            return 0.0;
        }
        if t == 0 || t > c {
            return f64::NEG_INFINITY;
        }
        self.grow_to(c);
        self.rows[c - 1][t - 1]
    }

    fn grow_to(&mut self, customers: usize) {
        if self.rows.is_empty() && customers > 0 {
            self.rows.push(vec![0.0]); // S_d(1, 1) = 1
        }
        while self.rows.len() < customers {
            let n = self.rows.len() + 1;
            let prev = &self.rows[n - 2];
            let mut row = Vec::with_capacity(n);
            for t in 1..=n {
                let opened = if t >= 2 {
                    prev[t - 2]
                } else {
                    f64::NEG_INFINITY
                };
                let joined = if t <= n - 1 {
                    let weight = (n - 1) as f64 - self.discount * t as f64;
                    if weight > 0.0 {
                        weight.ln() + prev[t - 1]
                    } else {
                        f64::NEG_INFINITY
                    }
                } else {
                    f64::NEG_INFINITY
                };
                row.push(log_add_exp(opened, joined));
            }
            self.rows.push(row);
        }
    }
}
