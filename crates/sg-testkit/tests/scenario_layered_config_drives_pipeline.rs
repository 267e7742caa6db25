//! Scenario: One layered config feeds every typed section
//!
//! # Invariants under test
//!
//! 1. Later YAML layers override earlier ones, and each crate reads its own
//!    section into its typed config.
//! 2. A config that only uses consumed sections reports no unused keys.
//! 3. Invalid values in any section fail pipeline construction.
//! 4. The audit environment follows `engine.mode`.

use sg_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};
use sg_scan::RankBy;
use sg_testkit::{NoHistory, Pipeline};

const BASE: &str = r#"
engine:
  mode: PAPER
portfolio:
  capital: 100000
risk:
  base_per_trade_risk_pct: 1.0
  max_open_positions: 5
  capital_concentration:
    top_n: 3
    max_pct: 60
correlation:
  lookback_months: 3
  min_overlap: 20
scan:
  percentile: 0.92
  max_signals: 20
audit:
  dir: logs/audit
"#;

const LIVE_OVERRIDE: &str = r#"
engine:
  mode: LIVE
portfolio:
  capital: 250000
risk:
  base_per_trade_risk_pct: 0.5
correlation:
  lookback_months: 6
scan:
  max_workers: 12
  rank_by: confidence
"#;

#[test]
fn override_layer_reaches_every_section() -> anyhow::Result<()> {
    let p = Pipeline::from_yaml(&[BASE, LIVE_OVERRIDE], NoHistory)?;

    assert_eq!(p.gate.state().capital, 250_000.0);
    assert_eq!(p.gate.config().base_per_trade_risk_pct, 0.5);
    assert_eq!(p.gate.config().max_open_positions, 5);
    assert_eq!(p.gate.status().correlation_cache_entries, 0);
    assert_eq!(p.scan.max_workers, Some(12));
    assert_eq!(p.scan.pool_size(500), 12);
    assert_eq!(p.scan.rank_by, RankBy::Confidence);
    assert_eq!(p.scan.percentile, 0.92);
    assert_eq!(p.audit.environment(), "LIVE");
    Ok(())
}

#[test]
fn consumed_sections_report_clean() -> anyhow::Result<()> {
    let loaded = load_layered_yaml_from_strings(&[BASE, LIVE_OVERRIDE])?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)?;
    assert!(report.is_clean(), "{:?}", report.unused_leaf_pointers);
    Ok(())
}

#[test]
fn config_hash_tracks_effective_values() -> anyhow::Result<()> {
    let a = Pipeline::from_yaml(&[BASE], NoHistory)?;
    let b = Pipeline::from_yaml(&[BASE], NoHistory)?;
    let c = Pipeline::from_yaml(&[BASE, LIVE_OVERRIDE], NoHistory)?;
    assert_eq!(a.config_hash, b.config_hash);
    assert_ne!(a.config_hash, c.config_hash);
    Ok(())
}

#[test]
fn invalid_section_values_fail_construction() {
    for bad in [
        "portfolio: {capital: 0}",
        "risk: {correlation_threshold: 1.5}",
        "correlation: {lookback_months: 0}",
        "scan: {percentile: 1.0}",
        "scan: {rank_by: volume}",
        "engine: {mode: SHADOW}",
    ] {
        assert!(
            Pipeline::from_yaml(&[BASE, bad], NoHistory).is_err(),
            "expected failure for {bad}"
        );
    }
}
