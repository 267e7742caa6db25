use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sg_config::{f64_at, str_at, usize_at};

/// Field the candidates are ranked (and percentile-filtered) by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankBy {
    Score,
    /// Bias-only mode.
    Confidence,
}

impl RankBy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "score" => Ok(RankBy::Score),
            "confidence" => Ok(RankBy::Confidence),
            other => bail!("invalid scan.rank_by '{other}'. expected one of: score | confidence"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScanConfig {
    /// Fixed pool size; `None` derives it from the universe size.
    pub max_workers: Option<usize>,
    /// Keep roughly the top `1 - percentile` of ranked candidates.
    pub percentile: f64,
    pub max_signals: usize,
    pub max_signals_per_sector: usize,
    pub rank_by: RankBy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            percentile: 0.92,
            max_signals: 20,
            max_signals_per_sector: 2,
            rank_by: RankBy::Score,
        }
    }
}

pub const MIN_POOL: usize = 10;
pub const MAX_POOL: usize = 40;

impl ScanConfig {
    /// Reads `/scan/*`; absent keys keep their defaults.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::default();
        if let Some(v) = usize_at(cfg, "/scan/max_workers")? {
            if v == 0 {
                bail!("CONFIG_INVALID: scan.max_workers must be >= 1");
            }
            out.max_workers = Some(v);
        }
        if let Some(v) = f64_at(cfg, "/scan/percentile")? {
            if !(0.0..1.0).contains(&v) {
                bail!("CONFIG_INVALID: scan.percentile must be within [0, 1) (got {v})");
            }
            out.percentile = v;
        }
        if let Some(v) = usize_at(cfg, "/scan/max_signals")? {
            out.max_signals = v;
        }
        if let Some(v) = usize_at(cfg, "/scan/max_signals_per_sector")? {
            out.max_signals_per_sector = v;
        }
        if let Some(v) = str_at(cfg, "/scan/rank_by")? {
            out.rank_by = RankBy::parse(v)?;
        }
        Ok(out)
    }

    /// Configured pool size, else clamp(universe / 10, 10, 40).
    pub fn pool_size(&self, universe_len: usize) -> usize {
        match self.max_workers {
            Some(n) => n.max(1),
            None => (universe_len / 10).clamp(MIN_POOL, MAX_POOL),
        }
    }
}
