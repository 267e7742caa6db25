use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sg_schemas::{Direction, RegimeKind};
use std::collections::BTreeMap;

/// Default capital base when `/portfolio/capital` is absent.
pub const DEFAULT_CAPITAL: f64 = 100_000.0;

// ─── PortfolioConfig ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioConfig {
    pub capital: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            capital: DEFAULT_CAPITAL,
        }
    }
}

impl PortfolioConfig {
    /// Reads `/portfolio/capital`. Capital must be finite and positive.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let capital = sg_config::f64_at(cfg, "/portfolio/capital")?.unwrap_or(DEFAULT_CAPITAL);
        if !capital.is_finite() || capital <= 0.0 {
            anyhow::bail!("CONFIG_INVALID: /portfolio/capital must be > 0 (got {capital})");
        }
        Ok(Self { capital })
    }
}

// ─── OpenPosition ─────────────────────────────────────────────────────────────

/// A position the gate has admitted (provisionally or confirmed).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPosition {
    pub symbol: String,
    pub sector: String,
    pub direction: Direction,
    pub position_value: f64,
    pub risk_amount: f64,
}

// ─── PortfolioState ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioState {
    pub daily_pnl_r: f64,
    pub weekly_pnl_r: f64,
    pub consecutive_losses: u32,
    pub open_positions: Vec<OpenPosition>,
    /// Static sizing base.
    pub capital: f64,
    pub peak_capital: f64,
    pub current_capital: f64,
    pub current_regime: RegimeKind,
    pub prev_regime: RegimeKind,
    /// Set when the daily loss limit trips; cleared only by `reset_daily`.
    pub daily_halted: bool,
    /// Set when the weekly loss limit trips; cleared only by `reset_weekly`.
    pub weekly_halted: bool,
    /// Percent of capital put at risk by approvals since `reset_daily`.
    /// Closing a position does not give the budget back.
    #[serde(default)]
    pub daily_risk_used_pct: f64,
}

/// Opaque marker of the open positions and daily risk at a point in time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Checkpoint {
    open_positions: usize,
    daily_risk_used_pct: f64,
}

impl PortfolioState {
    pub fn new(capital: f64) -> Self {
        Self {
            daily_pnl_r: 0.0,
            weekly_pnl_r: 0.0,
            consecutive_losses: 0,
            open_positions: Vec::new(),
            capital,
            peak_capital: capital,
            current_capital: capital,
            current_regime: RegimeKind::Unclassified,
            prev_regime: RegimeKind::Unclassified,
            daily_halted: false,
            weekly_halted: false,
            daily_risk_used_pct: 0.0,
        }
    }

    pub fn from_config(cfg: &PortfolioConfig) -> Self {
        Self::new(cfg.capital)
    }

    /// (peak − current) / peak × 100; 0 when peak is not positive.
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_capital <= 0.0 {
            return 0.0;
        }
        (self.peak_capital - self.current_capital) / self.peak_capital * 100.0
    }

    /// Clears the daily counter, the daily halt and the daily risk budget.
    pub fn reset_daily(&mut self) {
        self.daily_pnl_r = 0.0;
        self.daily_halted = false;
        self.daily_risk_used_pct = 0.0;
    }

    /// Clears the weekly counter, the weekly halt and the loss streak.
    pub fn reset_weekly(&mut self) {
        self.weekly_pnl_r = 0.0;
        self.weekly_halted = false;
        self.consecutive_losses = 0;
    }

    /// Adds `pnl_r` to both counters. A loss extends the streak, anything
    /// else (including scratch trades) resets it.
    pub fn record_trade_result(&mut self, pnl_r: f64) {
        self.daily_pnl_r += pnl_r;
        self.weekly_pnl_r += pnl_r;
        if pnl_r < 0.0 {
            self.consecutive_losses = self.consecutive_losses.saturating_add(1);
        } else {
            self.consecutive_losses = 0;
        }
        tracing::debug!(
            daily_pnl_r = self.daily_pnl_r,
            weekly_pnl_r = self.weekly_pnl_r,
            consecutive_losses = self.consecutive_losses,
            "trade result recorded"
        );
    }

    pub fn update_equity(&mut self, pnl_amount: f64) {
        self.current_capital += pnl_amount;
        if self.current_capital > self.peak_capital {
            self.peak_capital = self.current_capital;
        }
        let dd = self.drawdown_pct();
        if dd > 5.0 {
            tracing::warn!(drawdown_pct = dd, "portfolio in drawdown");
        }
    }

    pub fn add_position(&mut self, position: OpenPosition) {
        self.open_positions.push(position);
    }

    /// Charge an approval's risk (percent of capital) to today's budget.
    pub fn record_daily_risk(&mut self, risk_pct: f64) {
        self.daily_risk_used_pct += risk_pct;
    }

    /// Removes every open position for `symbol`; returns what was removed.
    pub fn remove_position(&mut self, symbol: &str) -> Vec<OpenPosition> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .open_positions
            .drain(..)
            .partition(|p| p.symbol == symbol);
        self.open_positions = kept;
        removed
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.open_positions.iter().any(|p| p.symbol == symbol)
    }

    /// Count of open positions sharing both sector and direction.
    pub fn positions_in(&self, sector: &str, direction: Direction) -> usize {
        self.open_positions
            .iter()
            .filter(|p| p.sector == sector && p.direction == direction)
            .count()
    }

    /// Total open position value in `sector`, both directions.
    pub fn sector_value(&self, sector: &str) -> f64 {
        self.open_positions
            .iter()
            .filter(|p| p.sector == sector)
            .map(|p| p.position_value)
            .sum()
    }

    /// Open symbols, sorted and deduplicated.
    pub fn open_symbols(&self) -> Vec<String> {
        let mut syms: Vec<String> = self.open_positions.iter().map(|p| p.symbol.clone()).collect();
        syms.sort();
        syms.dedup();
        syms
    }

    /// Open position count per sector.
    pub fn sector_concentration(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for p in &self.open_positions {
            *out.entry(p.sector.clone()).or_insert(0) += 1;
        }
        out
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            open_positions: self.open_positions.len(),
            daily_risk_used_pct: self.daily_risk_used_pct,
        }
    }

    /// Drop every position added after `cp` and give back the daily risk
    /// they used; returns the dropped positions. P&L counters and halt flags
    /// are not touched.
    pub fn rollback(&mut self, cp: Checkpoint) -> Vec<OpenPosition> {
        if cp.open_positions >= self.open_positions.len() {
            return Vec::new();
        }
        self.daily_risk_used_pct = self.daily_risk_used_pct.min(cp.daily_risk_used_pct);
        self.open_positions.split_off(cp.open_positions)
    }
}

impl Default for PortfolioState {
    fn default() -> Self {
        Self::new(DEFAULT_CAPITAL)
    }
}
