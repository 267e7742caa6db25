//! Audit hash chain integrity.
//!
//! GREEN when:
//! - Five events written through AuditLog verify cleanly.
//! - Mutating one byte of line 3's payload flags line 3 and breaks line 4.
//! - Deleting a line breaks the link of the line after it.
//! - A reopened log continues the chain from disk instead of genesis.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use sg_audit::{verify_chain, AuditConfig, AuditLog, GENESIS_HASH};
use sg_config::ConfigMode;
use std::fs;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
}

fn open_log(dir: &std::path::Path, now: DateTime<Utc>) -> AuditLog {
    AuditLog::open(AuditConfig::new(dir, ConfigMode::Paper))
        .unwrap()
        .with_clock(move || now)
}

fn write_five(log: &AuditLog) {
    for i in 0..5 {
        let out = log.log_event(
            "TEST_EVENT",
            json!({"index": i, "payload": format!("payload_{i}"), "price": 101.25 + i as f64}),
        );
        assert!(out.persisted);
    }
}

#[test]
fn untampered_chain_verifies_valid() {
    let tmp = tempfile::tempdir().unwrap();
    let log = open_log(tmp.path(), at(9, 15));
    write_five(&log);

    let r = verify_chain(log.file_for(at(9, 15).date_naive()));
    assert!(r.valid, "errors: {:?}", r.errors);
    assert_eq!(r.entries, 5);
}

#[test]
fn first_entry_chains_to_genesis() {
    let tmp = tempfile::tempdir().unwrap();
    let log = open_log(tmp.path(), at(9, 15));
    assert_eq!(log.last_hash(), GENESIS_HASH);

    let first = log.log_event("TEST_EVENT", json!({"n": 1}));
    assert_eq!(first.entry.prev_hash, GENESIS_HASH);
    assert_eq!(log.last_hash(), first.entry.hash);

    let second = log.log_event("TEST_EVENT", json!({"n": 2}));
    assert_eq!(second.entry.prev_hash, first.entry.hash);
    assert_eq!(second.entry.environment, "PAPER");
    assert_eq!(second.entry.versions.get("audit_trail").map(String::as_str), Some("2.0.0"));
}

#[test]
fn single_byte_payload_mutation_flags_line_and_successor() {
    let tmp = tempfile::tempdir().unwrap();
    let log = open_log(tmp.path(), at(9, 15));
    write_five(&log);
    let path = log.file_for(at(9, 15).date_naive());

    let content = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    assert!(lines[2].contains("\"index\":2"));
    lines[2] = lines[2].replacen("\"index\":2", "\"index\":7", 1);
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    let r = verify_chain(&path);
    assert!(!r.valid);
    assert_eq!(r.entries, 5);
    assert!(r.errors.iter().any(|e| e == "line 3: hash mismatch"), "{:?}", r.errors);
    assert!(r.errors.iter().any(|e| e == "line 4: prev_hash mismatch"), "{:?}", r.errors);
    assert_eq!(r.errors.len(), 2, "{:?}", r.errors);
}

#[test]
fn deleted_line_breaks_the_link() {
    let tmp = tempfile::tempdir().unwrap();
    let log = open_log(tmp.path(), at(9, 15));
    write_five(&log);
    let path = log.file_for(at(9, 15).date_naive());

    let content = fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 1)
        .map(|(_, l)| l)
        .collect();
    fs::write(&path, kept.join("\n") + "\n").unwrap();

    let r = verify_chain(&path);
    assert!(!r.valid);
    assert_eq!(r.entries, 4);
    assert_eq!(r.errors, vec!["line 2: prev_hash mismatch".to_string()]);
}

#[test]
fn reopened_log_continues_chain_from_disk() {
    let tmp = tempfile::tempdir().unwrap();
    let tail = {
        let log = open_log(tmp.path(), at(9, 15));
        write_five(&log);
        log.last_hash()
    };

    let reopened = open_log(tmp.path(), at(14, 0));
    assert_eq!(reopened.last_hash(), tail);
    let next = reopened.log_event("TEST_EVENT", json!({"after": "restart"}));
    assert_eq!(next.entry.prev_hash, tail);

    let r = reopened.verify_day(at(14, 0).date_naive());
    assert!(r.valid, "errors: {:?}", r.errors);
    assert_eq!(r.entries, 6);
}

#[test]
fn new_day_starts_a_new_file_at_genesis() {
    let tmp = tempfile::tempdir().unwrap();
    let day1 = open_log(tmp.path(), at(23, 59));
    day1.log_event("TEST_EVENT", json!({"d": 1}));

    let next_day = Utc.with_ymd_and_hms(2026, 3, 3, 0, 1, 0).unwrap();
    let day2 = open_log(tmp.path(), next_day);
    let first = day2.log_event("TEST_EVENT", json!({"d": 2}));
    assert_eq!(first.entry.prev_hash, GENESIS_HASH);
    assert!(tmp.path().join("audit_2026-03-02.jsonl").exists());
    assert!(tmp.path().join("audit_2026-03-03.jsonl").exists());
}
