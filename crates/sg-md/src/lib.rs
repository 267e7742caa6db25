//! sg-md
//!
//! Daily price-history boundary for the correlation gate.
//!
//! This crate owns the provider abstraction and the pure return-series math
//! built on top of it. It does **not** fetch data itself; concrete providers
//! are injected by the embedding process.

pub mod provider;

pub use provider::{DailyClose, HistoryRequest, PriceHistoryProvider, ProviderError};

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Simple daily returns keyed by the date of the later close.
///
/// Built from raw closes with:
/// - ascending date order,
/// - one close per date (the last one supplied wins),
/// - non-finite or non-positive closes dropped before differencing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnSeries {
    returns: BTreeMap<NaiveDate, f64>,
}

impl ReturnSeries {
    pub fn from_closes(closes: &[DailyClose]) -> Self {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for c in closes {
            if c.close.is_finite() && c.close > 0.0 {
                by_date.insert(c.date, c.close);
            }
        }

        let mut returns = BTreeMap::new();
        let mut prev: Option<f64> = None;
        for (date, close) in by_date {
            if let Some(p) = prev {
                returns.insert(date, close / p - 1.0);
            }
            prev = Some(close);
        }

        Self { returns }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Pairs of returns on dates present in both series, in date order.
    pub fn aligned_with(&self, other: &ReturnSeries) -> Vec<(f64, f64)> {
        self.returns
            .iter()
            .filter_map(|(date, a)| other.returns.get(date).map(|b| (*a, *b)))
            .collect()
    }
}

/// Pearson correlation of paired observations.
///
/// `None` when fewer than two pairs exist, when either side has zero variance,
/// or when the result is not finite. `None` is "undefined", never zero.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    let r = cov / (var_x.sqrt() * var_y.sqrt());
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}
