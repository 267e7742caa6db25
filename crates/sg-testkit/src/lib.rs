//! sg-testkit
//!
//! Fakes and builders shared by the cross-crate scenario tests under
//! `tests/`. Nothing here is used by production crates.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use sg_audit::{AuditConfig, AuditLog, ChainVerification};
use sg_config::LoadedConfig;
use sg_md::{DailyClose, HistoryRequest, PriceHistoryProvider, ProviderError};
use sg_portfolio::{PortfolioConfig, PortfolioState};
use sg_risk::{CorrelationConfig, RiskConfig, RiskGate};
use sg_scan::{CandidateAnalyzer, RegimeSource, ScanCancel, ScanConfig};
use sg_schemas::{Candidate, Direction, RegimeSnapshot, UniverseEntry};
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

/// Fixed wall clock used by every scenario.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 31, 9, 30, 0)
        .single()
        .unwrap_or_default()
}

pub fn today() -> NaiveDate {
    now().date_naive()
}

pub fn regime(label: &str) -> RegimeSnapshot {
    RegimeSnapshot {
        regime_label: label.to_string(),
        adx: 28.0,
        atr_pct: 1.4,
        change_pct: 0.6,
        as_of: now(),
    }
}

/// A valid long candidate: entry 100, stop 95, R:R 2.5.
pub fn candidate(symbol: &str, sector: &str, direction: Direction, score: f64) -> Candidate {
    let (entry, stop) = match direction {
        Direction::Buy => (100.0, 95.0),
        Direction::Sell => (100.0, 105.0),
    };
    Candidate {
        symbol: symbol.to_string(),
        sector: sector.to_string(),
        direction,
        score,
        confidence: (score / 100.0).clamp(0.0, 1.0),
        risk_reward_ratio: 2.5,
        entry_price: entry,
        stop_loss: stop,
        suggested_position_value: 10_000.0,
    }
}

pub fn universe(entries: &[(&str, &str)]) -> Vec<UniverseEntry> {
    entries
        .iter()
        .map(|(symbol, sector)| UniverseEntry::new(*symbol, *sector))
        .collect()
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// What [`ScriptedAnalyzer`] does for one symbol.
#[derive(Clone, Debug)]
pub enum Script {
    Emit(Candidate),
    Skip,
    Fail(String),
    Panic,
    /// Never completes; only cancellation ends the scan.
    Hang,
}

type DelayFn = Box<dyn Fn(&str) -> StdDuration + Send + Sync>;

/// Analyzer driven by a per-symbol script. Unscripted symbols yield no
/// candidate. Tracks peak concurrency.
pub struct ScriptedAnalyzer {
    scripts: BTreeMap<String, Script>,
    delay: Option<DelayFn>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedAnalyzer {
    pub fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn script(mut self, symbol: &str, script: Script) -> Self {
        self.scripts.insert(symbol.to_string(), script);
        self
    }

    pub fn emit(self, c: Candidate) -> Self {
        let symbol = c.symbol.clone();
        self.script(&symbol, Script::Emit(c))
    }

    /// Per-symbol latency, applied before the script runs.
    pub fn with_delay(mut self, f: impl Fn(&str) -> StdDuration + Send + Sync + 'static) -> Self {
        self.delay = Some(Box::new(f));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        entry: &UniverseEntry,
        _regime: &RegimeSnapshot,
    ) -> Result<Option<Candidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_in_flight, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(&entry.symbol)).await;
        }

        match self.scripts.get(&entry.symbol) {
            Some(Script::Emit(c)) => Ok(Some(c.clone())),
            Some(Script::Skip) | None => Ok(None),
            Some(Script::Fail(msg)) => Err(anyhow!("{msg}")),
            Some(Script::Panic) => panic!("scripted panic for {}", entry.symbol),
            Some(Script::Hang) => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// Regime sources
// ---------------------------------------------------------------------------

pub struct FixedRegime(pub RegimeSnapshot);

#[async_trait]
impl RegimeSource for FixedRegime {
    async fn snapshot(&self) -> Result<RegimeSnapshot> {
        Ok(self.0.clone())
    }
}

pub struct FailingRegime;

#[async_trait]
impl RegimeSource for FailingRegime {
    async fn snapshot(&self) -> Result<RegimeSnapshot> {
        Err(anyhow!("regime engine unavailable"))
    }
}

// ---------------------------------------------------------------------------
// Price history
// ---------------------------------------------------------------------------

/// Provider with no data; every lookup is a transport failure.
pub struct NoHistory;

impl PriceHistoryProvider for NoHistory {
    fn name(&self) -> &'static str {
        "none"
    }

    fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError> {
        Err(ProviderError::Transport(format!("offline: {}", req.symbol)))
    }
}

/// In-memory closes per symbol.
#[derive(Default)]
pub struct StaticHistory(BTreeMap<String, Vec<DailyClose>>);

impl StaticHistory {
    /// `days` daily closes ending today, shaped by `f(day_index)`.
    pub fn with(mut self, symbol: &str, days: i64, f: impl Fn(i64) -> f64) -> Self {
        let series = (0..days)
            .map(|i| DailyClose::new(today() - Duration::days(days - 1 - i), f(i)))
            .collect();
        self.0.insert(symbol.to_string(), series);
        self
    }
}

impl PriceHistoryProvider for StaticHistory {
    fn name(&self) -> &'static str {
        "static"
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

/// Deterministic non-trending price path.
pub fn wiggle(i: i64) -> f64 {
    100.0 + ((i * 7) % 11) as f64 - 5.0 + i as f64 * 0.1
}

/// Wraps a provider and fires `cancel` the first time history for
/// `trigger` is requested. Lets a test cancel a scan at an exact point in
/// the gate phase.
pub struct CancelOnLookup<P> {
    inner: P,
    trigger: String,
    cancel: ScanCancel,
}

impl<P> CancelOnLookup<P> {
    pub fn new(inner: P, trigger: &str, cancel: ScanCancel) -> Self {
        Self {
            inner,
            trigger: trigger.to_string(),
            cancel,
        }
    }
}

impl<P: PriceHistoryProvider> PriceHistoryProvider for CancelOnLookup<P> {
    fn name(&self) -> &'static str {
        "cancel-on-lookup"
    }

    fn daily_closes(&self, req: &HistoryRequest) -> Result<Vec<DailyClose>, ProviderError> {
        if req.symbol == self.trigger {
            self.cancel.cancel();
        }
        self.inner.daily_closes(req)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything a scan needs, built from one layered config. The audit
/// directory is always a private temp dir.
pub struct Pipeline {
    pub gate: RiskGate,
    pub audit: Arc<AuditLog>,
    pub scan: ScanConfig,
    pub config_hash: String,
    _dir: TempDir,
}

impl Pipeline {
    pub fn from_yaml(
        yaml_docs: &[&str],
        provider: impl PriceHistoryProvider + 'static,
    ) -> Result<Self> {
        let loaded = sg_config::load_layered_yaml_from_strings(yaml_docs)?;
        Self::from_loaded(&loaded, provider)
    }

    pub fn from_loaded(
        loaded: &LoadedConfig,
        provider: impl PriceHistoryProvider + 'static,
    ) -> Result<Self> {
        let cfg = &loaded.config_json;
        let dir = tempfile::tempdir().context("audit temp dir")?;

        let mut audit_cfg = AuditConfig::from_config_json(cfg)?;
        audit_cfg.dir = dir.path().to_path_buf();
        let audit = Arc::new(AuditLog::open(audit_cfg)?.with_clock(now));

        let state = PortfolioState::from_config(&PortfolioConfig::from_config_json(cfg)?);
        let gate = RiskGate::new(
            RiskConfig::from_config_json(cfg)?,
            state,
            CorrelationConfig::from_config_json(cfg)?,
            Arc::new(provider),
            Arc::clone(&audit),
        );

        Ok(Self {
            gate,
            audit,
            scan: ScanConfig::from_config_json(cfg)?,
            config_hash: loaded.config_hash.clone(),
            _dir: dir,
        })
    }

    /// Every audit entry written today, in order.
    pub fn events(&self) -> Vec<Value> {
        let Ok(content) = fs::read_to_string(self.audit.file_for(today())) else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e["event_type"].as_str().map(str::to_string))
            .collect()
    }

    /// Today's entries of one type.
    pub fn events_of(&self, event_type: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|e| e["event_type"] == event_type)
            .collect()
    }

    pub fn verify_today(&self) -> ChainVerification {
        self.audit.verify_day(today())
    }
}
