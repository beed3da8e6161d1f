//! Cosine similarity and deterministic ranking
//!
//! All scores are normalized to "higher = more similar" in `[-1, 1]`.
//! Ranking is by similarity descending, ties broken by `VectorId` ascending,
//! so identical queries give identical orderings on every backend.

use crate::types::SearchResult;
use std::cmp::Ordering;

/// Cosine similarity: dot(a,b) / (||a|| * ||b||)
///
/// Range: [-1, 1], higher = more similar
/// Returns 0.0 if either vector has zero norm (avoids division by zero)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(
        a.len(),
        b.len(),
        "Dimension mismatch in similarity computation"
    );

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        sanitize_similarity(dot_product(a, b) / (norm_a * norm_b))
    }
}

/// Convert a cosine distance in `[0, 2]` to similarity
pub fn similarity_from_cosine_distance(distance: f64) -> f32 {
    sanitize_similarity((1.0 - distance) as f32)
}

/// Clamp to `[-1, 1]`, mapping NaN to 0.0
///
/// Floating point error can push an exact match slightly above 1, and
/// backends report NaN for zero-norm vectors.
pub fn sanitize_similarity(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

/// Dot product (inner product)
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm (Euclidean length)
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Total order used for ranking
///
/// Similarity descending, then id ascending.
pub fn compare_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.similarity
        .partial_cmp(&a.similarity)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sanitize scores, sort deterministically and keep the first `top_k`
pub fn rank_results(mut results: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    for r in &mut results {
        r.similarity = sanitize_similarity(r.similarity);
    }
    results.sort_by(compare_results);
    results.truncate(top_k);
    results
}
