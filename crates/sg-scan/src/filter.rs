use crate::RankBy;
use sg_schemas::Candidate;
use std::cmp::Ordering;

/// Below this many candidates the percentile filter is a no-op.
pub const MIN_FILTER_INPUT: usize = 5;

fn rank_value(c: &Candidate, by: RankBy) -> f64 {
    match by {
        RankBy::Score => c.score,
        RankBy::Confidence => c.confidence,
    }
}

/// Split candidates into (rankable, unrankable). A non-finite score or
/// confidence cannot be ordered against the rest without distorting the
/// percentile threshold.
pub fn split_unrankable(candidates: Vec<Candidate>) -> (Vec<Candidate>, Vec<Candidate>) {
    candidates
        .into_iter()
        .partition(|c| c.score.is_finite() && c.confidence.is_finite())
}

/// Descending by rank value, ties by symbol. Total order, so the result does
/// not depend on the order candidates arrived in.
pub fn rank_candidates(candidates: &mut [Candidate], by: RankBy) {
    candidates.sort_by(|a, b| {
        rank_value(b, by)
            .total_cmp(&rank_value(a, by))
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.direction.cmp(&b.direction))
    });
}

/// Keep the top slice of an already ranked list.
///
/// cutoff = max(1, floor(n × (1 − percentile))); every candidate ranking at
/// least as high as the one at the cutoff survives, so ties at the boundary
/// are kept together and at least one candidate always remains.
pub fn percentile_filter(ranked: Vec<Candidate>, percentile: f64, by: RankBy) -> Vec<Candidate> {
    let n = ranked.len();
    if n < MIN_FILTER_INPUT {
        return ranked;
    }

    let raw = (n as f64 * (1.0 - percentile)).floor();
    let cutoff = if raw.is_finite() && raw >= 1.0 {
        (raw as usize).min(n)
    } else {
        1
    };
    let threshold = rank_value(&ranked[cutoff - 1], by);

    ranked
        .into_iter()
        .filter(|c| rank_value(c, by).total_cmp(&threshold) != Ordering::Less)
        .collect()
}
