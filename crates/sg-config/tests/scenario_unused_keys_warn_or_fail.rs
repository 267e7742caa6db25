use sg_config::{load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under consumed prefixes are not flagged.
/// 4) Deterministic ordering of unused pointers.

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
engine:
  mode: paper
  engine_id: "MAIN"

risk:
  weekly_loss_limit_r: 6.0

unused_section:
  foo: 123
  bar: 456
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).expect("config load must succeed");
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)
        .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/engine/engine_id".to_string(),
            "/unused_section/bar".to_string(),
            "/unused_section/foo".to_string(),
        ]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = r#"
scan:
  percentile: 0.9
scanner:
  typo: 1
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "got: {msg}");
    assert!(msg.contains("/scanner/typo"), "got: {msg}");
}

#[test]
fn fully_consumed_config_is_clean() {
    let yaml = r#"
engine:
  mode: live
portfolio:
  capital: 250000
risk:
  capital_concentration:
    max_pct: 60.0
correlation:
  min_overlap: 20
scan:
  max_workers: 16
audit:
  dir: "/var/log/sg/audit"
"#;

    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "unexpected: {:?}", report.unused_leaf_pointers);
}
