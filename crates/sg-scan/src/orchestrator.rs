use crate::{
    percentile_filter, rank_candidates, split_unrankable, CandidateAnalyzer, CandidateProducer,
    RegimeSource, ScanCancel, ScanConfig,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use sg_audit::event_types;
use sg_portfolio::Checkpoint;
use sg_risk::{PositionSize, ReasonCode, RegimeTransitionAction, RiskDecision, RiskGate};
use sg_schemas::{Candidate, RegimeSnapshot, UniverseEntry};
use std::sync::Arc;
use uuid::Uuid;

/// Reason recorded for candidates skipped by the per-sector cap.
pub const SECTOR_LIMIT: &str = "SECTOR_LIMIT";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedSignal {
    pub candidate: Candidate,
    pub size: PositionSize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSignal {
    pub symbol: String,
    pub reason: ReasonCode,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub scan_id: String,
    pub regime: RegimeSnapshot,
    pub regime_action: Option<RegimeTransitionAction>,
    pub pool_size: usize,
    pub universe: usize,
    pub analyzed: usize,
    pub failed: Vec<String>,
    pub produced: usize,
    pub filtered: usize,
    pub accepted: Vec<AcceptedSignal>,
    pub blocked: Vec<BlockedSignal>,
    pub skipped: Vec<String>,
    /// Positions undone because the scan was cancelled mid-gate.
    pub rolled_back: Vec<String>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn accepted_symbols(&self) -> Vec<&str> {
        self.accepted.iter().map(|a| a.candidate.symbol.as_str()).collect()
    }

    fn accepted_in_sector(&self, sector: &str) -> usize {
        self.accepted
            .iter()
            .filter(|a| a.candidate.sector == sector)
            .count()
    }

    fn record(&mut self, c: Candidate, decision: RiskDecision) {
        match decision {
            RiskDecision::Allow { size } => {
                self.accepted.push(AcceptedSignal { candidate: c, size });
            }
            RiskDecision::Block { reason, detail } => {
                self.blocked.push(BlockedSignal {
                    symbol: c.symbol,
                    reason,
                    detail,
                });
            }
        }
    }
}

/// Drives one scan end to end.
pub struct ScanOrchestrator {
    cfg: ScanConfig,
    producer: CandidateProducer,
    regime_source: Arc<dyn RegimeSource>,
    config_hash: Option<String>,
}

impl ScanOrchestrator {
    pub fn new(
        cfg: ScanConfig,
        analyzer: Arc<dyn CandidateAnalyzer>,
        regime_source: Arc<dyn RegimeSource>,
    ) -> Self {
        Self {
            cfg,
            producer: CandidateProducer::new(analyzer),
            regime_source,
            config_hash: None,
        }
    }

    /// Stamp the loaded config hash into SCAN_STARTED.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.cfg
    }

    /// Run one scan. Only a regime-source failure is an error; everything
    /// else (symbol failures, blocks, cancellation) is reported.
    pub async fn run(
        &self,
        gate: &mut RiskGate,
        universe: &[UniverseEntry],
        cancel: &ScanCancel,
    ) -> Result<ScanReport> {
        let scan_id = Uuid::new_v4().to_string();
        let audit = Arc::clone(gate.audit());

        let snapshot = self
            .regime_source
            .snapshot()
            .await
            .context("regime snapshot failed")?;
        let regime_action = gate.apply_regime(&snapshot);
        let regime = Arc::new(snapshot);
        let pool_size = self.cfg.pool_size(universe.len());

        tracing::info!(
            scan_id = scan_id.as_str(),
            regime = regime.regime_label.as_str(),
            universe = universe.len(),
            pool_size,
            "scan started"
        );
        audit.log_event(
            event_types::SCAN_STARTED,
            json!({
                "scan_id": scan_id,
                "regime": regime.regime_label,
                "regime_kind": regime.kind(),
                "universe_size": universe.len(),
                "pool_size": pool_size,
                "config_hash": self.config_hash,
            }),
        );

        let produced = self
            .producer
            .produce(universe, Arc::clone(&regime), pool_size, cancel)
            .await;

        let mut report = ScanReport {
            scan_id: scan_id.clone(),
            regime: (*regime).clone(),
            regime_action,
            pool_size,
            universe: universe.len(),
            analyzed: produced.analyzed,
            failed: produced.failed,
            produced: produced.candidates.len(),
            filtered: 0,
            accepted: Vec::new(),
            blocked: Vec::new(),
            skipped: Vec::new(),
            rolled_back: Vec::new(),
            cancelled: false,
        };

        if produced.cancelled {
            report.cancelled = true;
            audit.log_event(
                event_types::SCAN_ABORTED,
                json!({
                    "scan_id": scan_id,
                    "phase": "PRODUCE",
                    "analyzed": report.analyzed,
                    "rolled_back": Vec::<String>::new(),
                }),
            );
            return Ok(report);
        }

        let (mut ranked, unrankable) = split_unrankable(produced.candidates);
        if !unrankable.is_empty() {
            tracing::warn!(
                scan_id = scan_id.as_str(),
                count = unrankable.len(),
                "non-finite score or confidence; candidates sent to the gate unranked"
            );
        }
        rank_candidates(&mut ranked, self.cfg.rank_by);
        let filtered = percentile_filter(ranked, self.cfg.percentile, self.cfg.rank_by);
        report.filtered = filtered.len();

        // Never ranked; the gate's validation rejects each one.
        let as_of = regime.as_of.date_naive();
        for c in unrankable {
            let decision = gate.evaluate(&c, as_of);
            report.record(c, decision);
        }

        self.gate_pass(gate, &scan_id, as_of, filtered, cancel, &mut report);

        if !report.cancelled {
            tracing::info!(
                scan_id = scan_id.as_str(),
                accepted = report.accepted.len(),
                blocked = report.blocked.len(),
                skipped = report.skipped.len(),
                failed = report.failed.len(),
                "scan completed"
            );
            audit.log_event(
                event_types::SCAN_COMPLETED,
                json!({
                    "scan_id": scan_id,
                    "universe_size": report.universe,
                    "analyzed": report.analyzed,
                    "failed": report.failed.len(),
                    "produced": report.produced,
                    "filtered": report.filtered,
                    "accepted": report.accepted_symbols(),
                    "blocked": report.blocked.len(),
                    "skipped": report.skipped.len(),
                }),
            );
        }

        Ok(report)
    }

    fn gate_pass(
        &self,
        gate: &mut RiskGate,
        scan_id: &str,
        as_of: NaiveDate,
        ranked: Vec<Candidate>,
        cancel: &ScanCancel,
        report: &mut ScanReport,
    ) {
        let checkpoint = gate.checkpoint();

        for c in ranked {
            if cancel.is_cancelled() {
                abort_gate(gate, scan_id, checkpoint, report);
                return;
            }

            if report.accepted.len() >= self.cfg.max_signals {
                tracing::info!(scan_id, max_signals = self.cfg.max_signals, "signal cap reached");
                break;
            }

            let taken = report.accepted_in_sector(&c.sector);
            if taken >= self.cfg.max_signals_per_sector {
                gate.audit().log_signal_decision(
                    &c.symbol,
                    "SKIPPED",
                    SECTOR_LIMIT,
                    json!({
                        "sector": c.sector,
                        "accepted_in_sector": taken,
                        "limit": self.cfg.max_signals_per_sector,
                    }),
                );
                report.skipped.push(c.symbol.clone());
                continue;
            }

            let decision = gate.evaluate(&c, as_of);
            report.record(c, decision);
        }

        // A cancel raised while the last candidate was evaluated.
        if cancel.is_cancelled() {
            abort_gate(gate, scan_id, checkpoint, report);
        }
    }
}

/// Undo every position this scan admitted and audit the abort.
fn abort_gate(
    gate: &mut RiskGate,
    scan_id: &str,
    checkpoint: Checkpoint,
    report: &mut ScanReport,
) {
    let rolled_back: Vec<String> = gate
        .rollback(checkpoint)
        .into_iter()
        .map(|p| p.symbol)
        .collect();
    tracing::warn!(
        scan_id,
        rolled_back = rolled_back.len(),
        "scan cancelled during gate phase"
    );
    gate.audit().log_event(
        event_types::SCAN_ABORTED,
        json!({
            "scan_id": scan_id,
            "phase": "GATE",
            "decided": report.accepted.len() + report.blocked.len(),
            "rolled_back": rolled_back,
        }),
    );
    report.rolled_back = rolled_back;
    report.accepted.clear();
    report.cancelled = true;
}
