#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use sg_audit::{AuditConfig, AuditLog};
use sg_config::ConfigMode;
use sg_md::{DailyClose, HistoryRequest, PriceHistoryProvider, ProviderError};
use sg_portfolio::{OpenPosition, PortfolioState};
use sg_risk::{CorrelationConfig, RiskConfig, RiskGate};
use sg_schemas::{Candidate, Direction, RegimeKind};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 31, 9, 30, 0).unwrap()
}

pub fn as_of() -> NaiveDate {
    now().date_naive()
}

/// Provider with no history at all: every lookup is a transport failure.
pub struct NoHistory;

impl PriceHistoryProvider for NoHistory {
    fn name(&self) -> &'static str {
        "none"
    }

    fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError> {
        Err(ProviderError::Transport(format!("offline: {}", req.symbol)))
    }
}

/// Fixed closes per symbol.
#[derive(Default)]
pub struct Closes(pub BTreeMap<String, Vec<DailyClose>>);

impl Closes {
    /// 60 daily closes ending at `as_of`, shaped by `f(day_index)`.
    pub fn with(mut self, symbol: &str, f: impl Fn(i64) -> f64) -> Self {
        let series = (0..60)
            .map(|i| DailyClose::new(as_of() - Duration::days(59 - i), f(i)))
            .collect();
        self.0.insert(symbol.to_string(), series);
        self
    }
}

impl PriceHistoryProvider for Closes {
    fn name(&self) -> &'static str {
        "closes"
    }

    fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError> {
        self.0
            .get(&req.symbol)
            .map(|v| {
                v.iter()
                    .copied()
                    .filter(|c| c.date >= req.start && c.date <= req.end)
                    .collect()
            })
            .ok_or_else(|| ProviderError::UnknownSymbol(req.symbol.clone()))
    }
}

pub fn wiggle(i: i64) -> f64 {
    100.0 + ((i * 7) % 11) as f64 - 5.0 + i as f64 * 0.1
}

pub fn candidate(symbol: &str, sector: &str, direction: Direction, entry: f64, stop: f64) -> Candidate {
    Candidate {
        symbol: symbol.to_string(),
        sector: sector.to_string(),
        direction,
        score: 80.0,
        confidence: 0.7,
        risk_reward_ratio: 2.5,
        entry_price: entry,
        stop_loss: stop,
        suggested_position_value: 10_000.0,
    }
}

pub fn position(symbol: &str, sector: &str, direction: Direction, value: f64, risk: f64) -> OpenPosition {
    OpenPosition {
        symbol: symbol.to_string(),
        sector: sector.to_string(),
        direction,
        position_value: value,
        risk_amount: risk,
    }
}

pub fn trending_state(capital: f64) -> PortfolioState {
    let mut st = PortfolioState::new(capital);
    st.current_regime = RegimeKind::Trending;
    st
}

pub struct Harness {
    pub gate: RiskGate,
    pub audit: Arc<AuditLog>,
    _dir: TempDir,
}

impl Harness {
    pub fn new(cfg: RiskConfig, state: PortfolioState, provider: impl PriceHistoryProvider + 'static) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let audit = Arc::new(
            AuditLog::open(AuditConfig::new(dir.path(), ConfigMode::Paper))
                .unwrap()
                .with_clock(now),
        );
        let gate = RiskGate::new(
            cfg,
            state,
            CorrelationConfig::default(),
            Arc::new(provider),
            audit.clone(),
        );
        Self {
            gate,
            audit,
            _dir: dir,
        }
    }

    /// Every audit entry written today, in order.
    pub fn events(&self) -> Vec<Value> {
        let path = self.audit.file_for(as_of());
        let Ok(content) = fs::read_to_string(path) else {
            return Vec::new();
        };
        content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| e["event_type"].as_str().unwrap().to_string())
            .collect()
    }
}
