//! Agreement scoring over answer embeddings.
//!
//! The agreement score `S` is the weighted mean pairwise cosine similarity of
//! the successful answers; each model also gets an individual agreement `a_i`
//! (its weighted mean similarity to everyone else). Weights are normalised to
//! sum to one before any of this runs.

/// Tolerance used when comparing scores and weight sums.
pub const SCORE_EPSILON: f64 = 1e-9;

/// Normalise optional per-model weights to sum to one.
///
/// Missing weights default to uniform. Callers are expected to have validated
/// positivity already; a degenerate sum also falls back to uniform.
pub fn normalized_weights(explicit: Option<&[f64]>, n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    match explicit {
        Some(weights) if weights.len() == n => {
            let sum: f64 = weights.iter().sum();
            if sum > SCORE_EPSILON && sum.is_finite() {
                weights.iter().map(|w| w / sum).collect()
            } else {
                vec![1.0 / n as f64; n]
            }
        }
        _ => vec![1.0 / n as f64; n],
    }
}

/// Cosine similarity clipped to `[0, 1]`.
///
/// Mismatched dimensions or zero vectors score 0.
pub fn cosine_clipped(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Weighted pairwise agreement score `S`.
///
/// `S = Σ_{i<j} w_i·w_j·s_ij / Σ_{i<j} w_i·w_j`, defined as 1 when fewer than
/// two answers remain.
pub fn agreement_score(embeddings: &[Vec<f32>], weights: &[f64]) -> f64 {
    let n = embeddings.len();
    if n < 2 {
        return 1.0;
    }
    debug_assert_eq!(n, weights.len());

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..n {
        for j in (i + 1)..n {
            let pair_weight = weights[i] * weights[j];
            numerator += pair_weight * cosine_clipped(&embeddings[i], &embeddings[j]);
            denominator += pair_weight;
        }
    }
    if denominator <= SCORE_EPSILON {
        return 1.0;
    }
    (numerator / denominator).clamp(0.0, 1.0)
}

/// Individual agreement `a_i` for every answer.
///
/// `a_i = Σ_{j≠i} w_j·s_ij / Σ_{j≠i} w_j`. A lone answer agrees with itself.
pub fn individual_agreements(embeddings: &[Vec<f32>], weights: &[f64]) -> Vec<f64> {
    let n = embeddings.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    debug_assert_eq!(n, weights.len());

    (0..n)
        .map(|i| {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for j in 0..n {
                if i == j {
                    continue;
                }
                numerator += weights[j] * cosine_clipped(&embeddings[i], &embeddings[j]);
                denominator += weights[j];
            }
            if denominator <= SCORE_EPSILON {
                1.0
            } else {
                (numerator / denominator).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Adaptive weight suggestion `w'_i = a_i / Σ a_j`.
///
/// Returned to the caller for inspection; never applied to scoring.
pub fn suggested_weights(individual: &[f64]) -> Vec<f64> {
    let n = individual.len();
    if n == 0 {
        return Vec::new();
    }
    let sum: f64 = individual.iter().sum();
    if sum <= SCORE_EPSILON {
        return vec![1.0 / n as f64; n];
    }
    individual.iter().map(|a| a / sum).collect()
}

/// Index of the answer with the highest individual agreement.
///
/// Ties resolve to the lower index, so selection is stable across runs.
pub fn select_consensus(individual: &[f64]) -> usize {
    let mut best = 0;
    for (i, &score) in individual.iter().enumerate().skip(1) {
        if score > individual[best] + SCORE_EPSILON {
            best = i;
        }
    }
    best
}
