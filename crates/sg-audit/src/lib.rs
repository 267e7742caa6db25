//! sg-audit
//!
//! Append-only, hash-chained audit trail. One JSON Lines file per UTC calendar
//! day (`audit_YYYY-MM-DD.jsonl`); every entry carries the hash of the entry
//! before it, the first entry of a file chains to [`GENESIS_HASH`].
//!
//! Writing is single-writer: reading the chain head, hashing and appending
//! happen inside one mutex-guarded critical section. A failed append never
//! propagates; the entry goes to a secondary, non-chained [`FallbackSink`]
//! and the chain head stays where it was.

mod report;
mod verify;

pub use report::{
    get_compliance_report, ComplianceReport, ComplianceSummary, DayReport, MAX_REPORT_DAYS,
};
pub use verify::{verify_chain, verify_chain_str, ChainVerification};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sg_config::ConfigMode;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// prev_hash of the first entry in every daily file.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Component versions stamped on every entry.
pub const SYSTEM_VERSIONS: &[(&str, &str)] = &[
    ("audit_trail", "2.0.0"),
    ("correlation_gate", "2.0.0"),
    ("portfolio_state", "2.2.0"),
    ("risk_rules", "2.6.0"),
    ("scan_engine", "2.0.0"),
];

pub fn system_versions() -> BTreeMap<String, String> {
    SYSTEM_VERSIONS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Event type strings written by the workspace.
pub mod event_types {
    pub const SIGNAL_DECISION: &str = "SIGNAL_DECISION";
    pub const RISK_INTERVENTION: &str = "RISK_INTERVENTION";
    pub const TRADE_ENTRY: &str = "TRADE_ENTRY";
    pub const TRADE_EXIT: &str = "TRADE_EXIT";
    pub const CIRCUIT_BREAKER_RESET: &str = "CIRCUIT_BREAKER_RESET";
    pub const COUNTER_RESET: &str = "COUNTER_RESET";
    pub const REGIME_TRANSITION: &str = "REGIME_TRANSITION";
    pub const SCAN_STARTED: &str = "SCAN_STARTED";
    pub const SCAN_COMPLETED: &str = "SCAN_COMPLETED";
    pub const SCAN_ABORTED: &str = "SCAN_ABORTED";
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub versions: BTreeMap<String, String>,
    pub data: Value,
    pub environment: String,
    pub prev_hash: String,
    pub hash: String,
}

/// Result of one `log_event` call. `persisted == false` means the entry went
/// to the fallback sink and is not part of the chain.
#[derive(Debug, Clone)]
pub struct Appended {
    pub entry: AuditEntry,
    pub persisted: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    pub dir: PathBuf,
    pub environment: ConfigMode,
}

impl AuditConfig {
    pub fn new(dir: impl Into<PathBuf>, environment: ConfigMode) -> Self {
        Self {
            dir: dir.into(),
            environment,
        }
    }

    /// Reads `/audit/dir` (default `logs/audit`) and `/engine/mode`.
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let dir = sg_config::str_at(cfg, "/audit/dir")?.unwrap_or("logs/audit");
        let environment = ConfigMode::from_config_json(cfg)?;
        Ok(Self::new(dir, environment))
    }
}

// ---------------------------------------------------------------------------
// Fallback sink
// ---------------------------------------------------------------------------

/// Secondary, non-chained destination for entries that could not be appended.
pub trait FallbackSink: Send + Sync {
    fn record(&self, line: &str, error: &anyhow::Error);
}

/// Default fallback: the process log.
#[derive(Debug, Default)]
pub struct TracingFallback;

impl FallbackSink for TracingFallback {
    fn record(&self, line: &str, error: &anyhow::Error) {
        tracing::error!(target: "audit_fallback", error = %format!("{error:#}"), "audit append failed");
        tracing::warn!(target: "audit_fallback", "AUDIT_FALLBACK: {line}");
    }
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Chain head for the day currently being written.
#[derive(Debug)]
struct ChainCursor {
    day: NaiveDate,
    last_hash: String,
}

/// Hash-chained daily audit log. Share it as `Arc<AuditLog>`; all methods
/// take `&self`.
pub struct AuditLog {
    dir: PathBuf,
    environment: String,
    versions: BTreeMap<String, String>,
    clock: Clock,
    fallback: Box<dyn FallbackSink>,
    cursor: Mutex<ChainCursor>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("dir", &self.dir)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl AuditLog {
    /// Creates the audit directory and seeds the chain head from today's file.
    pub fn open(config: AuditConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)
            .with_context(|| format!("create_dir_all {:?}", config.dir))?;

        let clock: Clock = Box::new(Utc::now);
        let today = clock().date_naive();
        let cursor = ChainCursor {
            day: today,
            last_hash: read_last_hash(&file_for_day(&config.dir, today)),
        };

        Ok(Self {
            dir: config.dir,
            environment: config.environment.as_str().to_string(),
            versions: system_versions(),
            clock,
            fallback: Box::new(TracingFallback),
            cursor: Mutex::new(cursor),
        })
    }

    /// Replace the wall clock (tests, replays). Re-seeds the chain head for
    /// the clock's current day from disk.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        let today = (self.clock)().date_naive();
        let head = read_last_hash(&self.file_for(today));
        *self.cursor.get_mut().unwrap_or_else(PoisonError::into_inner) = ChainCursor {
            day: today,
            last_hash: head,
        };
        self
    }

    pub fn with_fallback(mut self, sink: impl FallbackSink + 'static) -> Self {
        self.fallback = Box::new(sink);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)().date_naive()
    }

    /// Path of the file holding `day`'s entries.
    pub fn file_for(&self, day: NaiveDate) -> PathBuf {
        file_for_day(&self.dir, day)
    }

    /// Hash the next entry will chain to.
    pub fn last_hash(&self) -> String {
        self.cursor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_hash
            .clone()
    }

    /// Append one event. Never fails: a write error routes the entry to the
    /// fallback sink and leaves the chain head untouched.
    pub fn log_event(&self, event_type: &str, data: Value) -> Appended {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        let now = (self.clock)();
        let day = now.date_naive();
        if cursor.day != day {
            // Day rollover: the new file's head comes from disk, not memory.
            *cursor = ChainCursor {
                day,
                last_hash: read_last_hash(&self.file_for(day)),
            };
        }

        let mut entry = AuditEntry {
            timestamp: now,
            event_type: event_type.to_string(),
            versions: self.versions.clone(),
            data,
            environment: self.environment.clone(),
            prev_hash: cursor.last_hash.clone(),
            hash: String::new(),
        };

        let line = match compute_entry_hash(&entry).and_then(|hash| {
            entry.hash = hash;
            canonical_json_line(&entry)
        }) {
            Ok(line) => line,
            Err(err) => {
                self.fallback.record(&format!("{entry:?}"), &err);
                return Appended {
                    entry,
                    persisted: false,
                };
            }
        };

        match append_line(&self.file_for(day), &line) {
            Ok(()) => {
                cursor.last_hash = entry.hash.clone();
                Appended {
                    entry,
                    persisted: true,
                }
            }
            Err(err) => {
                self.fallback.record(&line, &err);
                Appended {
                    entry,
                    persisted: false,
                }
            }
        }
    }

    /// Every gate decision, including sector-dedup skips.
    pub fn log_signal_decision(
        &self,
        symbol: &str,
        decision: &str,
        reason: &str,
        details: Value,
    ) -> Appended {
        self.log_event(
            event_types::SIGNAL_DECISION,
            json!({
                "symbol": symbol,
                "decision": decision,
                "reason": reason,
                "signal_details": details,
            }),
        )
    }

    pub fn log_risk_intervention(&self, action: &str, details: Value) -> Appended {
        self.log_event(
            event_types::RISK_INTERVENTION,
            json!({
                "action": action,
                "details": details,
            }),
        )
    }

    pub fn log_trade_entry(
        &self,
        symbol: &str,
        entry_price: f64,
        quantity: u64,
        position_value: f64,
        signal_id: &str,
    ) -> Appended {
        self.log_event(
            event_types::TRADE_ENTRY,
            json!({
                "symbol": symbol,
                "entry_price": entry_price,
                "quantity": quantity,
                "position_value": position_value,
                "signal_id": signal_id,
            }),
        )
    }

    pub fn log_trade_exit(&self, symbol: &str, exit_price: f64, pnl: f64, exit_reason: &str) -> Appended {
        self.log_event(
            event_types::TRADE_EXIT,
            json!({
                "symbol": symbol,
                "exit_price": exit_price,
                "pnl": pnl,
                "exit_reason": exit_reason,
            }),
        )
    }

    pub fn verify_day(&self, day: NaiveDate) -> ChainVerification {
        verify_chain(self.file_for(day))
    }

    pub fn compliance_report(&self, start: NaiveDate, end: NaiveDate) -> ComplianceReport {
        get_compliance_report(&self.dir, start, end, (self.clock)())
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

pub fn file_for_day(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("audit_{}.jsonl", day.format("%Y-%m-%d")))
}

/// Hash of the last entry in `path`; genesis when the file is missing, empty
/// or its last line carries no readable hash.
fn read_last_hash(path: &Path) -> String {
    let Ok(content) = fs::read_to_string(path) else {
        return GENESIS_HASH.to_string();
    };
    let Some(last) = content.lines().rev().find(|l| !l.trim().is_empty()) else {
        return GENESIS_HASH.to_string();
    };

    match serde_json::from_str::<Value>(last.trim())
        .ok()
        .and_then(|v| v.get("hash").and_then(Value::as_str).map(str::to_string))
    {
        Some(h) => h,
        None => {
            tracing::warn!(path = %path.display(), "last audit line unreadable; chaining to genesis");
            GENESIS_HASH.to_string()
        }
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    f.write_all(&buf).context("write audit line failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Canonical hashing
// ---------------------------------------------------------------------------

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    canonical_string(&raw)
}

fn canonical_string(v: &Value) -> Result<String> {
    serde_json::to_string(&sort_keys(v)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 over the canonical JSON of the entry WITHOUT its `hash` field.
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let raw = serde_json::to_value(entry).context("serialize audit entry failed")?;
    compute_value_hash(&raw)
}

/// Same as [`compute_entry_hash`] for an entry already parsed from disk.
/// Unknown fields take part in the hash; only `hash` is excluded.
pub fn compute_value_hash(entry: &Value) -> Result<String> {
    let mut hashable = entry.clone();
    if let Value::Object(map) = &mut hashable {
        map.remove("hash");
    }
    let canonical = canonical_string(&hashable)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
