//! sg-schemas
//!
//! Shared data model for the scan -> gate -> audit pipeline.
//!
//! Everything here is plain data: produced by external collaborators (the
//! strategy/scoring layer, the regime engine) and consumed by `sg-risk` and
//! `sg-scan`. JSON shapes are camelCase to match the upstream producers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Trade direction of a candidate or open position.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One scored trade candidate, produced once per scan by the analyzer and
/// consumed exactly once by the risk gate.
///
/// Prices are plain `f64` in instrument currency. `entry_price == stop_loss`
/// is representable on purpose: the gate rejects it as a validation failure
/// instead of the type system refusing to carry it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub symbol: String,
    pub sector: String,
    pub direction: Direction,
    pub score: f64,
    /// 0.0..=1.0 for bias-only candidates; informational for swing candidates.
    pub confidence: f64,
    pub risk_reward_ratio: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub suggested_position_value: f64,
}

impl Candidate {
    /// Absolute distance between entry and stop.
    pub fn stop_distance(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// Stop distance as a percentage of the entry price (0.0 when entry is 0).
    pub fn stop_distance_pct(&self) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        self.stop_distance() / self.entry_price * 100.0
    }
}

// ---------------------------------------------------------------------------
// Universe
// ---------------------------------------------------------------------------

/// One tradable symbol of the scan universe with its sector classification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseEntry {
    pub symbol: String,
    pub sector: String,
}

impl UniverseEntry {
    pub fn new(symbol: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sector: sector.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Market regime classification used by every regime-keyed table.
///
/// Parsed from the free-form regime label with [`RegimeKind::from_label`].
/// Labels that do not start with a known keyword become `Unclassified`, which
/// every table maps to its single documented default entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeKind {
    Trending,
    Bullish,
    Ranging,
    Sideways,
    Volatile,
    Dead,
    Unclassified,
}

impl RegimeKind {
    /// Parse a regime label such as `"TRENDING"`, `"trending (bullish)"` or
    /// `"Volatile-High"`.
    ///
    /// Only the leading alphabetic word is considered and it must equal a
    /// keyword exactly (case-insensitive). `"NEUTRAL"`, `""` and anything else
    /// map to `Unclassified`.
    pub fn from_label(label: &str) -> Self {
        let word: String = label
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match word.as_str() {
            "TRENDING" => RegimeKind::Trending,
            "BULLISH" => RegimeKind::Bullish,
            "RANGING" => RegimeKind::Ranging,
            "SIDEWAYS" => RegimeKind::Sideways,
            "VOLATILE" => RegimeKind::Volatile,
            "DEAD" => RegimeKind::Dead,
            _ => RegimeKind::Unclassified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeKind::Trending => "TRENDING",
            RegimeKind::Bullish => "BULLISH",
            RegimeKind::Ranging => "RANGING",
            RegimeKind::Sideways => "SIDEWAYS",
            RegimeKind::Volatile => "VOLATILE",
            RegimeKind::Dead => "DEAD",
            RegimeKind::Unclassified => "UNCLASSIFIED",
        }
    }
}

impl Default for RegimeKind {
    fn default() -> Self {
        RegimeKind::Unclassified
    }
}

impl fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the market regime, fetched once per scan and
/// shared read-only with every worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeSnapshot {
    pub regime_label: String,
    pub adx: f64,
    pub atr_pct: f64,
    pub change_pct: f64,
    pub as_of: DateTime<Utc>,
}

impl RegimeSnapshot {
    pub fn kind(&self) -> RegimeKind {
        RegimeKind::from_label(&self.regime_label)
    }
}
