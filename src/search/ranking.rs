//! Popularity-blended ordering of similarity hits.

use crate::catalog::{ScoredResult, ToolRecord};
use std::cmp::Ordering;
use std::num::IntErrorKind;

/// Usage count that earns one full point of bonus, before the cap.
const POPULARITY_SCALE: f64 = 10_000.0;

/// Popularity can lift a result by at most this much, so it only reorders
/// near-ties and never overturns a clear relevance gap.
pub const MAX_POPULARITY_BONUS: f64 = 0.1;

/// Parse a listed usage count such as `"12,500+"`.
///
/// Returns None for empty or non-numeric values; these simply get no bonus.
/// Counts beyond the `i128` range saturate instead of being dropped.
pub fn parse_popularity(raw: &str) -> Option<i128> {
    let digits: String = raw.chars().filter(|c| *c != '+' && *c != ',').collect();
    match digits.trim().parse::<i128>() {
        Ok(count) => Some(count),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i128::MAX),
            IntErrorKind::NegOverflow => Some(i128::MIN),
            _ => None,
        },
    }
}

pub fn popularity_bonus(raw: &str) -> f64 {
    parse_popularity(raw)
        .map(|count| (count as f64 / POPULARITY_SCALE).min(MAX_POPULARITY_BONUS))
        .unwrap_or(0.0)
}

/// Turn index hits into ranked results.
///
/// Hits whose row id falls outside `corpus` are dropped. Results are sorted
/// by final score descending; the sort is stable so equal scores keep the
/// index's order. Ranks are assigned after sorting.
pub fn rank_hits(corpus: &[ToolRecord], scores: &[f32], ids: &[usize]) -> Vec<ScoredResult> {
    let mut results: Vec<ScoredResult> = scores
        .iter()
        .zip(ids)
        .filter_map(|(&score, &idx)| {
            let tool = corpus.get(idx)?.clone();
            let relevance_score = f64::from(score);
            let final_score = relevance_score + popularity_bonus(&tool.popularity);
            Some(ScoredResult {
                tool,
                relevance_score,
                final_score,
                rank: 0,
            })
        })
        .collect();

    results.sort_by(|a, b| descending(a.final_score, b.final_score));

    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    results
}

/// Total descending order on scores. NaN sorts after every real score and
/// `-0.0` ties with `0.0`.
pub(crate) fn descending(a: f64, b: f64) -> Ordering {
    fn key(score: f64) -> f64 {
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score + 0.0
        }
    }
    key(b).total_cmp(&key(a))
}
