mod common;

use common::*;
use sg_risk::{ReasonCode, RiskConfig};
use sg_schemas::Direction;

fn base_config() -> RiskConfig {
    let mut cfg = RiskConfig::sane_defaults();
    cfg.base_per_trade_risk_pct = 0.5;
    cfg
}

#[test]
fn highly_correlated_candidate_is_blocked() {
    let provider = Closes::default()
        .with("HDFCBANK", wiggle)
        .with("KOTAKBANK", |i| wiggle(i) * 3.0)
        .with("SUNPHARMA", |i| 50.0 + ((i * 5) % 7) as f64);
    let mut h = Harness::new(base_config(), trending_state(100_000.0), provider);

    let a = candidate("HDFCBANK", "Banking", Direction::Buy, 100.0, 95.0);
    let b = candidate("KOTAKBANK", "Finance", Direction::Buy, 100.0, 95.0);
    assert!(h.gate.evaluate(&a, as_of()).is_allowed());
    assert_eq!(h.gate.evaluate(&b, as_of()).reason(), Some(ReasonCode::Correlation));
    assert_eq!(h.gate.status().correlation_cache_entries, 1);

    h.gate.clear_correlation_cache();
    assert_eq!(h.gate.status().correlation_cache_entries, 0);
}

#[test]
fn missing_history_fails_open() {
    let mut h = Harness::new(base_config(), trending_state(100_000.0), NoHistory);
    let a = candidate("HDFCBANK", "Banking", Direction::Buy, 100.0, 95.0);
    let b = candidate("KOTAKBANK", "Finance", Direction::Buy, 100.0, 95.0);
    assert!(h.gate.evaluate(&a, as_of()).is_allowed());
    assert!(h.gate.evaluate(&b, as_of()).is_allowed());
    assert_eq!(h.gate.status().correlation_cache_entries, 0);
}
