//! Scenario: Per-sector and per-scan signal caps are enforced before the gate
//!
//! # Invariants under test
//!
//! 1. Once a sector has `max_signals_per_sector` accepted signals, further
//!    candidates in it are SKIPPED (audited with reason SECTOR_LIMIT) without
//!    reaching the risk gate.
//! 2. A blocked candidate does not use up its sector's allowance.
//! 3. The scan stops evaluating once `max_signals` have been accepted.

use sg_scan::{ScanCancel, ScanOrchestrator, SECTOR_LIMIT};
use sg_schemas::Direction;
use sg_testkit::{candidate, regime, universe, FixedRegime, NoHistory, Pipeline, ScriptedAnalyzer};
use std::sync::Arc;

#[tokio::test]
async fn third_signal_in_a_sector_is_skipped_not_gated() -> anyhow::Result<()> {
    let mut p = Pipeline::from_yaml(&["risk: {base_per_trade_risk_pct: 0.5}"], NoHistory)?;
    assert_eq!(p.scan.max_signals_per_sector, 2);

    let mut poor_rr = candidate("A", "Banking", Direction::Buy, 95.0);
    poor_rr.risk_reward_ratio = 1.0;

    let analyzer = ScriptedAnalyzer::new()
        .emit(poor_rr)
        .emit(candidate("B", "Banking", Direction::Buy, 90.0))
        .emit(candidate("C", "Banking", Direction::Sell, 85.0))
        .emit(candidate("D", "Banking", Direction::Sell, 80.0));
    let orch = ScanOrchestrator::new(
        p.scan.clone(),
        Arc::new(analyzer),
        Arc::new(FixedRegime(regime("TRENDING"))),
    );

    let symbols = universe(&[("A", "Banking"), ("B", "Banking"), ("C", "Banking"), ("D", "Banking")]);
    let report = orch.run(&mut p.gate, &symbols, &ScanCancel::new()).await?;

    assert_eq!(report.blocked.len(), 1);
    assert_eq!(report.blocked[0].symbol, "A");
    assert_eq!(report.accepted_symbols(), vec!["B", "C"]);
    assert_eq!(report.skipped, vec!["D".to_string()]);

    let decisions = p.events_of("SIGNAL_DECISION");
    assert_eq!(decisions.len(), 4);
    let skipped = &decisions[3];
    assert_eq!(skipped["data"]["symbol"], "D");
    assert_eq!(skipped["data"]["decision"], "SKIPPED");
    assert_eq!(skipped["data"]["reason"], SECTOR_LIMIT);
    assert_eq!(skipped["data"]["signal_details"]["limit"], 2);

    // A validation failure is not a portfolio intervention, and neither is a skip.
    assert!(p.events_of("RISK_INTERVENTION").is_empty());
    assert!(!p.gate.state().has_position("D"));
    Ok(())
}

#[tokio::test]
async fn scan_stops_at_max_signals() -> anyhow::Result<()> {
    let mut p = Pipeline::from_yaml(
        &["risk: {base_per_trade_risk_pct: 0.5}", "scan: {max_signals: 1}"],
        NoHistory,
    )?;
    let analyzer = ScriptedAnalyzer::new()
        .emit(candidate("A", "Banking", Direction::Buy, 90.0))
        .emit(candidate("B", "Tech", Direction::Buy, 85.0))
        .emit(candidate("C", "Energy", Direction::Buy, 80.0));
    let orch = ScanOrchestrator::new(
        p.scan.clone(),
        Arc::new(analyzer),
        Arc::new(FixedRegime(regime("TRENDING"))),
    );

    let symbols = universe(&[("A", "Banking"), ("B", "Tech"), ("C", "Energy")]);
    let report = orch.run(&mut p.gate, &symbols, &ScanCancel::new()).await?;

    assert_eq!(report.accepted_symbols(), vec!["A"]);
    assert!(report.blocked.is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(p.events_of("SIGNAL_DECISION").len(), 1);
    assert_eq!(p.gate.state().open_positions.len(), 1);
    Ok(())
}
