//! Offline chain verification.
//!
//! Never fails: every problem (missing file, bad JSON, hash mismatch, broken
//! link) becomes a line-tagged diagnostic. Nothing is repaired.

use crate::{compute_value_hash, GENESIS_HASH};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Non-empty lines seen, parseable or not.
    pub entries: usize,
    pub errors: Vec<String>,
}

impl ChainVerification {
    fn broken(error: String) -> Self {
        Self {
            valid: false,
            entries: 0,
            errors: vec![error],
        }
    }
}

pub fn verify_chain(path: impl AsRef<Path>) -> ChainVerification {
    let path = path.as_ref();
    if !path.exists() {
        return ChainVerification::broken(format!("file not found: {}", path.display()));
    }
    match fs::read_to_string(path) {
        Ok(content) => verify_chain_str(&content),
        Err(e) => ChainVerification::broken(format!("read failed: {}: {e}", path.display())),
    }
}

/// Verify the contents of one daily file.
///
/// Line `n` is checked twice: its stored `hash` against the recomputed hash,
/// and its `prev_hash` against the recomputed hash of line `n - 1` (genesis
/// for line 1). A mutated line therefore fails its own check and breaks the
/// link of the line after it.
pub fn verify_chain_str(content: &str) -> ChainVerification {
    let mut errors = Vec::new();
    let mut entries = 0usize;
    // None after an unparseable line: the next link cannot be checked.
    let mut expected_prev: Option<String> = Some(GENESIS_HASH.to_string());

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        entries += 1;

        let v: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                errors.push(format!("line {line_no}: invalid json: {e}"));
                expected_prev = None;
                continue;
            }
        };

        let recomputed = match compute_value_hash(&v) {
            Ok(h) => h,
            Err(e) => {
                errors.push(format!("line {line_no}: hash computation failed: {e:#}"));
                expected_prev = None;
                continue;
            }
        };

        match v.get("hash").and_then(Value::as_str) {
            Some(stored) if stored == recomputed => {}
            Some(_) => errors.push(format!("line {line_no}: hash mismatch")),
            None => errors.push(format!("line {line_no}: missing hash")),
        }

        let prev = v.get("prev_hash").and_then(Value::as_str);
        match (&expected_prev, prev) {
            (Some(exp), Some(p)) if exp == p => {}
            (Some(_), Some(_)) => errors.push(format!("line {line_no}: prev_hash mismatch")),
            (_, None) => errors.push(format!("line {line_no}: missing prev_hash")),
            (None, Some(_)) => {}
        }

        expected_prev = Some(recomputed);
    }

    ChainVerification {
        valid: errors.is_empty(),
        entries,
        errors,
    }
}
