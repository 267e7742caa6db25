use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sg_config::{f64_at, usize_at};
use sg_schemas::RegimeKind;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Regime tables
// ---------------------------------------------------------------------------

/// Value per regime with one default for every kind not listed
/// (including `Unclassified`).
#[derive(Clone, Debug, PartialEq)]
pub struct RegimeTable<T> {
    entries: BTreeMap<RegimeKind, T>,
    default: T,
}

impl<T: Copy> RegimeTable<T> {
    pub fn new(entries: &[(RegimeKind, T)], default: T) -> Self {
        Self {
            entries: entries.iter().copied().collect(),
            default,
        }
    }

    pub fn get(&self, kind: RegimeKind) -> T {
        self.entries.get(&kind).copied().unwrap_or(self.default)
    }

    pub fn default_value(&self) -> T {
        self.default
    }
}

/// Daily loss limit in R per regime; unlisted regimes use `base`.
pub fn daily_limit_table(base: f64) -> RegimeTable<f64> {
    RegimeTable::new(
        &[
            (RegimeKind::Trending, 3.0),
            (RegimeKind::Bullish, 3.0),
            (RegimeKind::Ranging, 1.5),
            (RegimeKind::Sideways, 1.5),
            (RegimeKind::Volatile, 1.0),
            (RegimeKind::Dead, 0.0),
        ],
        base,
    )
}

/// Position size multiplier per regime.
pub fn regime_multiplier_table() -> RegimeTable<f64> {
    RegimeTable::new(
        &[
            (RegimeKind::Trending, 1.0),
            (RegimeKind::Bullish, 1.0),
            (RegimeKind::Ranging, 0.6),
            (RegimeKind::Sideways, 0.6),
            (RegimeKind::Volatile, 0.5),
            (RegimeKind::Dead, 0.0),
        ],
        0.7,
    )
}

/// Ascending `(drawdown_pct_below, multiplier)` brackets; first match wins.
pub const DRAWDOWN_BRACKETS: &[(f64, f64)] = &[(5.0, 1.0), (10.0, 0.7), (15.0, 0.4)];

/// Multiplier once drawdown is past the last bracket.
pub const DRAWDOWN_FLOOR_MULTIPLIER: f64 = 0.2;

pub fn drawdown_multiplier(drawdown_pct: f64) -> f64 {
    DRAWDOWN_BRACKETS
        .iter()
        .find(|(below, _)| drawdown_pct < *below)
        .map(|(_, m)| *m)
        .unwrap_or(DRAWDOWN_FLOOR_MULTIPLIER)
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct CapitalConcentrationConfig {
    pub top_n: usize,
    /// Percent of total open risk.
    pub max_pct: f64,
    /// Hypothetical set size below which the check is skipped.
    pub min_positions: usize,
}

/// Risk configuration (thresholds + regime tables).
#[derive(Clone, Debug, PartialEq)]
pub struct RiskConfig {
    /// Percent of capital risked per trade before multipliers.
    pub base_per_trade_risk_pct: f64,
    /// Daily loss limit (R) for regimes without their own entry.
    pub base_daily_loss_limit_r: f64,
    pub weekly_loss_limit_r: f64,
    pub consecutive_loss_limit: u32,
    pub max_same_sector_direction: usize,
    /// Percent of capital.
    pub max_sector_exposure_pct: f64,
    pub correlation_threshold: f64,
    pub capital_concentration: CapitalConcentrationConfig,
    pub min_risk_reward: f64,
    /// Percent of entry price.
    pub max_stop_loss_pct: f64,
    pub max_open_positions: usize,
    /// Percent of capital that approvals may put at risk per day.
    pub max_daily_risk_pct: f64,

    pub daily_limits: RegimeTable<f64>,
    pub regime_multipliers: RegimeTable<f64>,
}

impl RiskConfig {
    pub fn sane_defaults() -> Self {
        Self {
            base_per_trade_risk_pct: 1.0,
            base_daily_loss_limit_r: 2.0,
            weekly_loss_limit_r: 6.0,
            consecutive_loss_limit: 3,
            max_same_sector_direction: 2,
            max_sector_exposure_pct: 30.0,
            correlation_threshold: 0.8,
            capital_concentration: CapitalConcentrationConfig {
                top_n: 3,
                max_pct: 60.0,
                min_positions: 4,
            },
            min_risk_reward: 2.0,
            max_stop_loss_pct: 5.0,
            max_open_positions: 5,
            max_daily_risk_pct: 2.0,
            daily_limits: daily_limit_table(2.0),
            regime_multipliers: regime_multiplier_table(),
        }
    }

    /// Reads `/risk/*`; every absent key keeps its default.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let mut out = Self::sane_defaults();

        if let Some(v) = f64_at(cfg, "/risk/base_per_trade_risk_pct")? {
            out.base_per_trade_risk_pct = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/base_daily_loss_limit_r")? {
            out.base_daily_loss_limit_r = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/weekly_loss_limit_r")? {
            out.weekly_loss_limit_r = v;
        }
        if let Some(v) = usize_at(cfg, "/risk/consecutive_loss_limit")? {
            out.consecutive_loss_limit = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = usize_at(cfg, "/risk/max_same_sector_direction")? {
            out.max_same_sector_direction = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/max_sector_exposure_pct")? {
            out.max_sector_exposure_pct = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/correlation_threshold")? {
            out.correlation_threshold = v;
        }
        if let Some(v) = usize_at(cfg, "/risk/capital_concentration/top_n")? {
            out.capital_concentration.top_n = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/capital_concentration/max_pct")? {
            out.capital_concentration.max_pct = v;
        }
        if let Some(v) = usize_at(cfg, "/risk/capital_concentration/min_positions")? {
            out.capital_concentration.min_positions = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/min_risk_reward")? {
            out.min_risk_reward = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/max_stop_loss_pct")? {
            out.max_stop_loss_pct = v;
        }
        if let Some(v) = usize_at(cfg, "/risk/max_open_positions")? {
            out.max_open_positions = v;
        }
        if let Some(v) = f64_at(cfg, "/risk/max_daily_risk_pct")? {
            out.max_daily_risk_pct = v;
        }

        out.daily_limits = daily_limit_table(out.base_daily_loss_limit_r);
        out.validate()?;
        Ok(out)
    }

    fn validate(&self) -> Result<()> {
        let non_negative = [
            ("base_per_trade_risk_pct", self.base_per_trade_risk_pct),
            ("base_daily_loss_limit_r", self.base_daily_loss_limit_r),
            ("weekly_loss_limit_r", self.weekly_loss_limit_r),
            ("max_sector_exposure_pct", self.max_sector_exposure_pct),
            ("capital_concentration.max_pct", self.capital_concentration.max_pct),
            ("min_risk_reward", self.min_risk_reward),
            ("max_stop_loss_pct", self.max_stop_loss_pct),
            ("max_daily_risk_pct", self.max_daily_risk_pct),
        ];
        for (name, v) in non_negative {
            if !v.is_finite() || v < 0.0 {
                bail!("CONFIG_INVALID: risk.{name} must be a finite value >= 0 (got {v})");
            }
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            bail!(
                "CONFIG_INVALID: risk.correlation_threshold must be within [0, 1] (got {})",
                self.correlation_threshold
            );
        }
        let cc = &self.capital_concentration;
        if cc.top_n == 0 {
            bail!("CONFIG_INVALID: risk.capital_concentration.top_n must be >= 1");
        }
        // At or below top_n positions the top-N share is always 100%.
        if cc.min_positions <= cc.top_n {
            bail!(
                "CONFIG_INVALID: risk.capital_concentration.min_positions must exceed top_n ({}), got {}",
                cc.top_n,
                cc.min_positions
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Machine-readable reason a candidate was blocked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    // Validation
    InvalidCandidate,
    ZeroStopDistance,
    RiskRewardTooLow,
    StopTooWide,

    // Rules, in evaluation order
    DailyLossLimit,
    WeeklyLossLimit,
    CircuitBreaker,
    SectorDirectionConcentration,
    Correlation,
    SectorExposure,
    CapitalConcentration,
    MaxOpenPositions,
    DailyRiskCap,

    // Sizing
    ZeroPositionSize,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidCandidate => "INVALID_CANDIDATE",
            ReasonCode::ZeroStopDistance => "ZERO_STOP_DISTANCE",
            ReasonCode::RiskRewardTooLow => "RISK_REWARD_TOO_LOW",
            ReasonCode::StopTooWide => "STOP_TOO_WIDE",
            ReasonCode::DailyLossLimit => "DAILY_LOSS_LIMIT",
            ReasonCode::WeeklyLossLimit => "WEEKLY_LOSS_LIMIT",
            ReasonCode::CircuitBreaker => "CIRCUIT_BREAKER",
            ReasonCode::SectorDirectionConcentration => "SECTOR_DIRECTION_CONCENTRATION",
            ReasonCode::Correlation => "CORRELATION",
            ReasonCode::SectorExposure => "SECTOR_EXPOSURE",
            ReasonCode::CapitalConcentration => "CAPITAL_CONCENTRATION",
            ReasonCode::MaxOpenPositions => "MAX_OPEN_POSITIONS",
            ReasonCode::DailyRiskCap => "DAILY_RISK_CAP",
            ReasonCode::ZeroPositionSize => "ZERO_POSITION_SIZE",
        }
    }

    /// Portfolio rules emit a RISK_INTERVENTION entry on top of the decision.
    pub fn is_intervention(&self) -> bool {
        !matches!(
            self,
            ReasonCode::InvalidCandidate
                | ReasonCode::ZeroStopDistance
                | ReasonCode::RiskRewardTooLow
                | ReasonCode::StopTooWide
                | ReasonCode::ZeroPositionSize
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ReasonCode {}

/// Computed size for an allowed candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSize {
    pub risk_amount: f64,
    pub regime_multiplier: f64,
    pub drawdown_multiplier: f64,
    pub shares: u64,
    pub position_value: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RiskDecision {
    Allow { size: PositionSize },
    Block { reason: ReasonCode, detail: String },
}

impl RiskDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskDecision::Allow { .. })
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            RiskDecision::Allow { .. } => None,
            RiskDecision::Block { reason, .. } => Some(*reason),
        }
    }
}

/// Action required when the regime changes under open positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeTransitionAction {
    #[serde(rename = "TIGHTEN_SL")]
    TightenStops,
}

impl RegimeTransitionAction {
    pub fn for_transition(prev: RegimeKind, current: RegimeKind) -> Option<Self> {
        match (prev, current) {
            (RegimeKind::Trending, RegimeKind::Ranging | RegimeKind::Sideways | RegimeKind::Dead) => {
                Some(RegimeTransitionAction::TightenStops)
            }
            (RegimeKind::Ranging, RegimeKind::Volatile) => Some(RegimeTransitionAction::TightenStops),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeTransitionAction::TightenStops => "TIGHTEN_SL",
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Operator snapshot of the gate and its portfolio state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub daily_pnl_r: f64,
    pub weekly_pnl_r: f64,
    pub consecutive_losses: u32,
    pub daily_loss_limit_r: f64,
    pub weekly_loss_limit_r: f64,
    pub consecutive_loss_limit: u32,
    pub correlation_threshold: f64,
    pub is_kill_switch_active: bool,
    pub is_circuit_breaker_active: bool,
    pub daily_halted: bool,
    pub weekly_halted: bool,
    pub open_trade_count: usize,
    pub daily_risk_used_pct: f64,
    pub max_daily_risk_pct: f64,
    pub current_regime: RegimeKind,
    pub prev_regime: RegimeKind,
    pub regime_multiplier: f64,
    pub drawdown_pct: f64,
    pub drawdown_multiplier: f64,
    pub current_capital: f64,
    pub peak_capital: f64,
    pub sector_concentration: BTreeMap<String, usize>,
    pub correlation_cache_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn regime_tables_fall_back_to_one_default() {
        let daily = daily_limit_table(2.0);
        assert_eq!(daily.get(RegimeKind::Trending), 3.0);
        assert_eq!(daily.get(RegimeKind::Sideways), 1.5);
        assert_eq!(daily.get(RegimeKind::Dead), 0.0);
        assert_eq!(daily.get(RegimeKind::Unclassified), 2.0);

        let mult = regime_multiplier_table();
        assert_eq!(mult.get(RegimeKind::Volatile), 0.5);
        assert_eq!(mult.get(RegimeKind::Unclassified), 0.7);
    }

    #[test]
    fn drawdown_brackets_first_match() {
        assert_eq!(drawdown_multiplier(0.0), 1.0);
        assert_eq!(drawdown_multiplier(4.99), 1.0);
        assert_eq!(drawdown_multiplier(5.0), 0.7);
        assert_eq!(drawdown_multiplier(12.0), 0.4);
        assert_eq!(drawdown_multiplier(15.0), 0.2);
        assert_eq!(drawdown_multiplier(80.0), 0.2);
    }

    #[test]
    fn config_overrides_and_rebuilds_daily_table() {
        let cfg = RiskConfig::from_config_json(&json!({
            "risk": {
                "base_daily_loss_limit_r": 2.5,
                "max_sector_exposure_pct": "25",
                "capital_concentration": {"max_pct": 70}
            }
        }))
        .unwrap();
        assert_eq!(cfg.daily_limits.get(RegimeKind::Unclassified), 2.5);
        assert_eq!(cfg.daily_limits.get(RegimeKind::Trending), 3.0);
        assert_eq!(cfg.max_sector_exposure_pct, 25.0);
        assert_eq!(cfg.capital_concentration.max_pct, 70.0);
        assert_eq!(cfg.capital_concentration.top_n, 3);
        assert_eq!(RiskConfig::from_config_json(&json!({})).unwrap(), RiskConfig::sane_defaults());
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        assert!(RiskConfig::from_config_json(&json!({"risk": {"correlation_threshold": 1.5}})).is_err());
        assert!(RiskConfig::from_config_json(&json!({"risk": {"weekly_loss_limit_r": -1}})).is_err());
        assert!(RiskConfig::from_config_json(&json!({"risk": {"max_daily_risk_pct": -0.5}})).is_err());
    }

    #[test]
    fn concentration_min_positions_must_exceed_top_n() {
        let err = RiskConfig::from_config_json(&json!({
            "risk": {"capital_concentration": {"min_positions": 2}}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("min_positions"), "{err}");

        assert!(RiskConfig::from_config_json(&json!({
            "risk": {"capital_concentration": {"top_n": 2, "min_positions": 2}}
        }))
        .is_err());

        let cfg = RiskConfig::from_config_json(&json!({
            "risk": {"capital_concentration": {"top_n": 2, "min_positions": 3}}
        }))
        .unwrap();
        assert_eq!(cfg.capital_concentration.min_positions, 3);
    }

    #[test]
    fn transition_actions() {
        use RegimeKind::*;
        assert_eq!(
            RegimeTransitionAction::for_transition(Trending, Ranging),
            Some(RegimeTransitionAction::TightenStops)
        );
        assert_eq!(
            RegimeTransitionAction::for_transition(Ranging, Volatile),
            Some(RegimeTransitionAction::TightenStops)
        );
        assert_eq!(RegimeTransitionAction::for_transition(Trending, Volatile), None);
        assert_eq!(RegimeTransitionAction::for_transition(Unclassified, Dead), None);
    }

    #[test]
    fn reason_codes_are_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ReasonCode::SectorDirectionConcentration).unwrap(),
            json!("SECTOR_DIRECTION_CONCENTRATION")
        );
        assert!(ReasonCode::Correlation.is_intervention());
        assert!(!ReasonCode::ZeroStopDistance.is_intervention());
    }
}
