//! Scenario: Produce phase shares one regime snapshot and isolates failures
//!
//! # Invariants under test
//!
//! 1. Every worker sees the same locked snapshot instance.
//! 2. Errors and panics become sorted `failed` symbols; the rest is analyzed.
//! 3. Ranking makes the candidate list independent of completion order.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sg_scan::{rank_candidates, CandidateAnalyzer, CandidateProducer, RankBy, ScanCancel};
use sg_schemas::{Candidate, Direction, RegimeSnapshot, UniverseEntry};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Recording {
    seen: Mutex<BTreeSet<usize>>,
}

#[async_trait]
impl CandidateAnalyzer for Recording {
    async fn analyze(
        &self,
        entry: &UniverseEntry,
        regime: &RegimeSnapshot,
    ) -> anyhow::Result<Option<Candidate>> {
        self.seen
            .lock()
            .unwrap()
            .insert(regime as *const RegimeSnapshot as usize);

        let n: u64 = entry.symbol[1..].parse()?;
        tokio::time::sleep(Duration::from_millis(20 - n)).await;
        match n {
            3 => anyhow::bail!("bad data for {}", entry.symbol),
            7 => panic!("analyzer bug"),
            _ => Ok(Some(Candidate {
                symbol: entry.symbol.clone(),
                sector: entry.sector.clone(),
                direction: Direction::Buy,
                score: 50.0 + (n % 4) as f64,
                confidence: 0.5,
                risk_reward_ratio: 2.5,
                entry_price: 100.0,
                stop_loss: 96.0,
                suggested_position_value: 10_000.0,
            })),
        }
    }
}

fn snapshot() -> RegimeSnapshot {
    RegimeSnapshot {
        regime_label: "TRENDING".to_string(),
        adx: 30.0,
        atr_pct: 1.2,
        change_pct: 0.4,
        as_of: Utc.with_ymd_and_hms(2026, 3, 31, 9, 30, 0).unwrap(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn workers_share_one_snapshot_and_failures_are_isolated() {
    let analyzer = Arc::new(Recording {
        seen: Mutex::new(BTreeSet::new()),
    });
    let producer = CandidateProducer::new(analyzer.clone());
    let universe: Vec<UniverseEntry> = (0..12)
        .map(|i| UniverseEntry::new(format!("S{i}"), "Tech"))
        .collect();

    let out = producer
        .produce(&universe, Arc::new(snapshot()), 4, &ScanCancel::new())
        .await;

    assert!(!out.cancelled);
    assert_eq!(out.pool_size, 4);
    assert_eq!(out.failed, vec!["S3".to_string(), "S7".to_string()]);
    assert_eq!(out.analyzed, 10);
    assert_eq!(out.candidates.len(), 10);
    assert_eq!(analyzer.seen.lock().unwrap().len(), 1, "regime snapshot must be shared");

    let mut ranked = out.candidates;
    rank_candidates(&mut ranked, RankBy::Score);
    let order: Vec<&str> = ranked.iter().map(|c| c.symbol.as_str()).collect();
    // score = 50 + n % 4, ties by symbol (lexicographic).
    assert_eq!(
        order,
        vec!["S11", "S10", "S2", "S6", "S1", "S5", "S9", "S0", "S4", "S8"]
    );
}

#[tokio::test]
async fn zero_pool_is_treated_as_one() {
    let producer = CandidateProducer::new(Arc::new(Recording {
        seen: Mutex::new(BTreeSet::new()),
    }));
    let out = producer
        .produce(
            &[UniverseEntry::new("S1", "Tech")],
            Arc::new(snapshot()),
            0,
            &ScanCancel::new(),
        )
        .await;
    assert_eq!(out.pool_size, 1);
    assert_eq!(out.candidates.len(), 1);
}
