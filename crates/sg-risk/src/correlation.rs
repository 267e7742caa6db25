//! Correlation gate support.
//!
//! Memoizes the maximum absolute Pearson correlation between a candidate's
//! daily returns and every open symbol's daily returns. Entries live until
//! `clear()` (called once per trading day). Only a lookup that fetched
//! history for every symbol involved is cached; `NoData` and results missing
//! a pair because of a provider error are retried on the next lookup.

use anyhow::Result;
use chrono::{Duration, Months, NaiveDate};
use serde_json::Value;
use sg_config::usize_at;
use sg_md::{pearson, HistoryRequest, PriceHistoryProvider, ReturnSeries};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationConfig {
    /// Trailing window length, ending at the lookup date.
    pub lookback_months: u32,
    /// Overlapping daily returns required before a pair counts.
    pub min_overlap: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            lookback_months: 3,
            min_overlap: 20,
        }
    }
}

impl CorrelationConfig {
    /// Reads `/correlation/lookback_months` and `/correlation/min_overlap`.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(v) = usize_at(cfg, "/correlation/lookback_months")? {
            if v == 0 {
                anyhow::bail!("CONFIG_INVALID: correlation.lookback_months must be >= 1");
            }
            out.lookback_months = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = usize_at(cfg, "/correlation/min_overlap")? {
            out.min_overlap = v.max(2);
        }
        Ok(out)
    }

    /// First day of the window ending at `as_of`.
    pub fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of
            .checked_sub_months(Months::new(self.lookback_months))
            .unwrap_or_else(|| as_of - Duration::days(31 * i64::from(self.lookback_months)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CorrelationLookup {
    /// At least one pair had enough overlapping data.
    Computed {
        max_abs: f64,
        /// Pairs with enough overlap to be measured.
        pairs_used: usize,
        /// Open symbol that produced `max_abs`.
        symbol: String,
    },
    /// Nothing could be measured; the gate fails open.
    NoData,
}

impl CorrelationLookup {
    pub fn max_abs(&self) -> Option<f64> {
        match self {
            CorrelationLookup::Computed { max_abs, .. } => Some(*max_abs),
            CorrelationLookup::NoData => None,
        }
    }
}

type CacheKey = (String, Vec<String>);

#[derive(Debug, Default)]
pub struct CorrelationCache {
    cfg: CorrelationConfig,
    entries: HashMap<CacheKey, CorrelationLookup>,
}

impl CorrelationCache {
    pub fn new(cfg: CorrelationConfig) -> Self {
        Self {
            cfg,
            entries: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.cfg
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        tracing::debug!("correlation cache cleared");
    }

    /// Max |corr| between `symbol` and `open_symbols`, served from the cache
    /// when the same (symbol, open set) was already computed.
    pub fn lookup(
        &mut self,
        provider: &dyn PriceHistoryProvider,
        symbol: &str,
        open_symbols: &[String],
        as_of: NaiveDate,
    ) -> CorrelationLookup {
        if open_symbols.is_empty() {
            return CorrelationLookup::NoData;
        }

        let mut open: Vec<String> = open_symbols.to_vec();
        open.sort();
        open.dedup();
        let key = (symbol.to_string(), open);

        if let Some(hit) = self.entries.get(&key) {
            return hit.clone();
        }

        let (result, complete) = self.compute(provider, symbol, &key.1, as_of);
        if complete && matches!(result, CorrelationLookup::Computed { .. }) {
            self.entries.insert(key, result.clone());
        }
        result
    }

    /// The lookup plus whether every open symbol's history was fetched.

    fn compute(
        &self,
        provider: &dyn PriceHistoryProvider,
        symbol: &str,
        open_symbols: &[String],
        as_of: NaiveDate,
    ) -> (CorrelationLookup, bool) {
        let start = self.cfg.window_start(as_of);

        let Some(base) = self.returns(provider, symbol, start, as_of) else {
            return (CorrelationLookup::NoData, false);
        };

        let mut best: Option<(f64, &str)> = None;
        let mut pairs_used = 0usize;
        let mut complete = true;

        for other in open_symbols {
            let Some(theirs) = self.returns(provider, other, start, as_of) else {
                complete = false;
                continue;
            };
            let pairs = base.aligned_with(&theirs);
            if pairs.len() < self.cfg.min_overlap {
                tracing::debug!(
                    symbol,
                    other = other.as_str(),
                    overlap = pairs.len(),
                    need = self.cfg.min_overlap,
                    "correlation pair skipped: insufficient overlap"
                );
                continue;
            }
            let Some(r) = pearson(&pairs) else {
                continue;
            };
            pairs_used += 1;
            let abs = r.abs();
            if best.map_or(true, |(b, _)| abs > b) {
                best = Some((abs, other.as_str()));
            }
        }

        let lookup = match best {
            Some((max_abs, sym)) => CorrelationLookup::Computed {
                max_abs,
                pairs_used,
                symbol: sym.to_string(),
            },
            None => CorrelationLookup::NoData,
        };
        (lookup, complete)
    }

    fn returns(
        &self,
        provider: &dyn PriceHistoryProvider,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Option<ReturnSeries> {
        let req = HistoryRequest {
            symbol: symbol.to_string(),
            start,
            end,
        };
        match provider.daily_closes(&req) {
            Ok(closes) => Some(ReturnSeries::from_closes(&closes)),
            Err(err) => {
                tracing::warn!(
                    provider = provider.name(),
                    symbol,
                    error = %err,
                    "price history unavailable; correlation pair treated as uncorrelated"
                );
                None
            }
        }
    }
}
