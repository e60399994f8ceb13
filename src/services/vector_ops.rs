//! Vector operations with parallel processing.

use rayon::prelude::*;
use std::cmp::Ordering;

use crate::traits::SearchHit;

/// Utility struct for vector operations.
pub struct VectorOps;

impl VectorOps {
    /// Compute cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            0.0
        } else {
            dot_product / (norm_a * norm_b)
        }
    }

    /// Normalize a vector in-place to unit length.
    pub fn normalize_inplace(vector: &mut [f32]) {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
    }

    /// Batch normalize vectors in-place.
    pub fn batch_normalize(vectors: &mut [Vec<f32>]) {
        vectors.par_iter_mut().for_each(|vector| {
            Self::normalize_inplace(vector);
        });
    }
}

/// Score every corpus vector against `query` by cosine similarity and return
/// the best `top_k` hits, highest score first.
///
/// Equal scores keep corpus order. NaN scores sort last.
pub fn semantic_search(query: &[f32], corpus: &[Vec<f32>], top_k: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = corpus
        .par_iter()
        .enumerate()
        .map(|(corpus_id, candidate)| SearchHit {
            corpus_id,
            score: VectorOps::cosine_similarity(query, candidate),
        })
        .collect();

    hits.sort_by(|a, b| by_score_desc(a.score, b.score));
    hits.truncate(top_k);
    hits
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
