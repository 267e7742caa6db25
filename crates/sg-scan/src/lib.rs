//! sg-scan
//!
//! One scan = lock a regime snapshot, analyze the universe in parallel, rank
//! and percentile-filter the candidates, then walk them through the risk gate
//! one at a time.
//!
//! - Produce phase: bounded pool (`buffer_unordered`), one tokio task per
//!   symbol, read-only `Arc` handles only. A failing or panicking symbol
//!   yields no candidate and never aborts the scan.
//! - Gate phase: strictly sequential through `&mut RiskGate`.
//! - Candidates with a non-finite score or confidence are never ranked; they
//!   go straight to the gate, which rejects them one by one.
//! - Cancellation: [`ScanCancel`] stops the produce phase cooperatively and
//!   aborts the gate phase between candidates (and once more after the last
//!   one), rolling back this scan's provisional positions.

mod cancel;
mod config;
mod filter;
mod orchestrator;
mod producer;
pub mod telemetry;

pub use cancel::ScanCancel;
pub use config::{RankBy, ScanConfig};
pub use filter::{percentile_filter, rank_candidates, split_unrankable};
pub use orchestrator::{AcceptedSignal, BlockedSignal, ScanOrchestrator, ScanReport, SECTOR_LIMIT};
pub use producer::{CandidateProducer, ProduceOutcome};

use async_trait::async_trait;
use sg_schemas::{Candidate, RegimeSnapshot, UniverseEntry};

/// Strategy/scoring boundary: turns one symbol into at most one candidate.
///
/// `Ok(None)` means "no setup"; `Err` is a failure for that symbol only.
#[async_trait]
pub trait CandidateAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        entry: &UniverseEntry,
        regime: &RegimeSnapshot,
    ) -> anyhow::Result<Option<Candidate>>;
}

/// Regime engine boundary. Called exactly once per scan.
#[async_trait]
pub trait RegimeSource: Send + Sync {
    async fn snapshot(&self) -> anyhow::Result<RegimeSnapshot>;
}
