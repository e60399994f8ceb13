//! Core traits for sentence encoders.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::vector_ops;

/// Compute device an encoder is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cuda => f.write_str("cuda"),
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// A single similarity search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Position of the candidate in the searched corpus.
    pub corpus_id: usize,
    /// Cosine similarity between query and candidate.
    pub score: f32,
}

/// A loaded text embedding model.
///
/// Implementations are blocking; callers are expected to run them off the
/// async executor.
pub trait SentenceEncoder: Send + Sync {
    /// Encode `texts` into one vector each, in input order.
    ///
    /// Inputs are processed `batch_size` at a time and each is truncated to
    /// `max_tokens` tokens.
    fn encode(&self, texts: &[String], batch_size: usize, max_tokens: usize)
        -> Result<Vec<Vec<f32>>>;

    /// Rank `corpus` against `query`, best match first.
    fn similarity_search(&self, query: &[f32], corpus: &[Vec<f32>], top_k: usize) -> Vec<SearchHit> {
        vector_ops::semantic_search(query, corpus, top_k)
    }

    /// Output embedding dimension.
    fn dimension(&self) -> usize;

    /// Model identifier for reporting.
    fn model_name(&self) -> &str;

    /// Device inference runs on.
    fn device(&self) -> Device;
}
