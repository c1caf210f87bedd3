//! Dense vector helpers for embeddings.
//!
//! All functions are total: mismatched dimensions and zero-magnitude inputs
//! degrade to neutral values instead of panicking.

use rayon::prelude::*;

/// Euclidean (L2) norm.
#[must_use]
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit length. Returns `None` for a zero (or non-finite) vector.
#[must_use]
pub fn normalized(v: &[f32]) -> Option<Vec<f32>> {
    let norm = magnitude(v);
    if norm <= f32::EPSILON || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

/// Cosine similarity in `[-1, 1]`; 0 when either side has no magnitude or
/// the dimensions differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let denom = magnitude(a) * magnitude(b);
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}

/// `acc += weight * v`, ignoring a dimension mismatch.
pub fn add_scaled(acc: &mut [f32], v: &[f32], weight: f32) {
    if acc.len() != v.len() {
        return;
    }
    for (slot, x) in acc.iter_mut().zip(v) {
        *slot += weight * x;
    }
}

/// Weighted sum of `(vector, weight)` pairs, with weights renormalized over
/// the supplied components. Result is unit length, or `None` if it vanishes.
#[must_use]
pub fn blend(components: &[(&[f32], f32)]) -> Option<Vec<f32>> {
    let (first, _) = components.first()?;
    let total: f32 = components.iter().map(|(_, w)| *w).sum();
    if total <= f32::EPSILON {
        return None;
    }

    let mut acc = vec![0.0; first.len()];
    for (v, w) in components {
        add_scaled(&mut acc, v, w / total);
    }
    normalized(&acc)
}

/// Cosine similarity of `query` against many embeddings, computed in parallel.
#[must_use]
pub fn batch_cosine(query: &[f32], embeddings: &[Vec<f32>]) -> Vec<f32> {
    embeddings
        .par_iter()
        .map(|e| cosine_similarity(query, e))
        .collect()
}
