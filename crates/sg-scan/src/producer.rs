use crate::{CandidateAnalyzer, ScanCancel};
use futures_util::stream::{self, StreamExt};
use sg_schemas::{Candidate, RegimeSnapshot, UniverseEntry};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What the produce phase collected. `candidates` is in completion order;
/// callers rank it.
#[derive(Debug, Default)]
pub struct ProduceOutcome {
    pub candidates: Vec<Candidate>,
    /// Symbols whose analysis completed (with or without a candidate).
    pub analyzed: usize,
    /// Symbols whose analysis errored or panicked, sorted.
    pub failed: Vec<String>,
    pub pool_size: usize,
    pub cancelled: bool,
}

/// Aborts the task when the owning future is dropped (cancelled scan).
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Parallel candidate production over a fixed universe.
#[derive(Clone)]
pub struct CandidateProducer {
    analyzer: Arc<dyn CandidateAnalyzer>,
}

impl CandidateProducer {
    pub fn new(analyzer: Arc<dyn CandidateAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Analyze every symbol with at most `pool_size` in flight. The regime
    /// snapshot is shared read-only by every worker.
    pub async fn produce(
        &self,
        universe: &[UniverseEntry],
        regime: Arc<RegimeSnapshot>,
        pool_size: usize,
        cancel: &ScanCancel,
    ) -> ProduceOutcome {
        let pool_size = pool_size.max(1);
        let mut out = ProduceOutcome {
            pool_size,
            ..ProduceOutcome::default()
        };

        let analyzer = &self.analyzer;
        let regime = &regime;
        let mut results = stream::iter(universe.iter().cloned())
            .map(|entry| {
                let analyzer = Arc::clone(analyzer);
                let regime = Arc::clone(regime);
                let symbol = entry.symbol.clone();
                async move {
                    let mut task = AbortOnDrop(tokio::spawn(async move {
                        analyzer.analyze(&entry, &regime).await
                    }));
                    (symbol, (&mut task.0).await)
                }
            })
            .buffer_unordered(pool_size);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(
                        analyzed = out.analyzed,
                        collected = out.candidates.len(),
                        "scan cancelled during produce phase"
                    );
                    out.cancelled = true;
                    break;
                }
                next = results.next() => {
                    let Some((symbol, joined)) = next else { break };
                    match joined {
                        Ok(Ok(Some(candidate))) => {
                            out.analyzed += 1;
                            out.candidates.push(candidate);
                        }
                        Ok(Ok(None)) => out.analyzed += 1,
                        Ok(Err(err)) => {
                            tracing::warn!(symbol = symbol.as_str(), error = %format!("{err:#}"), "analysis failed");
                            out.failed.push(symbol);
                        }
                        Err(join_err) => {
                            tracing::warn!(symbol = symbol.as_str(), error = %join_err, "analysis task panicked");
                            out.failed.push(symbol);
                        }
                    }
                }
            }
        }

        out.failed.sort();
        out
    }
}
