//! Model service.
//!
//! Owns the shared encoder and exposes the two operations the HTTP layer
//! needs: embedding a batch of sentences and ranking sentences against a
//! query.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::models::RerankScore;
use crate::traits::{Device, SentenceEncoder};

/// Number of hits kept by the rerank similarity search.
pub const RERANK_TOP_K: usize = 10;

/// The main service wrapping the loaded embedding model.
#[derive(Clone)]
pub struct ModelService {
    encoder: Arc<dyn SentenceEncoder>,
    batch_size: usize,
    max_length: usize,
    max_query_length: usize,
}

impl ModelService {
    pub fn new(encoder: Arc<dyn SentenceEncoder>, config: &Config) -> Self {
        Self {
            encoder,
            batch_size: config.batch_size,
            max_length: config.max_length,
            max_query_length: config.max_query_length,
        }
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.encoder.model_name()
    }

    /// Get the embedding dimension.
    pub fn dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub fn device(&self) -> Device {
        self.encoder.device()
    }

    /// Encode every sentence, preserving input order.
    pub async fn embed(&self, sentences: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if sentences.is_empty() {
            return Ok(vec![]);
        }

        let encoder = Arc::clone(&self.encoder);
        let (batch_size, max_tokens) = (self.batch_size, self.max_length);
        let count = sentences.len();

        let vectors = run_blocking(move || encoder.encode(&sentences, batch_size, max_tokens)).await?;
        check_count(count, vectors.len())?;

        debug!("Embedded {} sentences", count);
        Ok(vectors)
    }

    /// Rank `sentences` by similarity to `query`, best match first.
    pub async fn rerank(&self, query: String, sentences: Vec<String>) -> Result<Vec<RerankScore>> {
        if sentences.is_empty() {
            return Ok(vec![]);
        }

        let encoder = Arc::clone(&self.encoder);
        let (batch_size, max_length, max_query_length) =
            (self.batch_size, self.max_length, self.max_query_length);
        let count = sentences.len();

        let hits = run_blocking(move || {
            let corpus = encoder.encode(&sentences, batch_size, max_length)?;
            check_count(count, corpus.len())?;

            let query_embedding = encoder
                .encode(&[query], 1, max_query_length)?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("No embedding returned for query"))?;

            Ok(encoder.similarity_search(&query_embedding, &corpus, RERANK_TOP_K))
        })
        .await?;

        debug!("Reranked {} sentences", count);
        Ok(hits
            .into_iter()
            .map(|hit| RerankScore {
                index: hit.corpus_id,
                score: hit.score,
            })
            .collect())
    }
}

fn check_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(anyhow!(
            "Model returned {} embeddings for {} inputs",
            actual,
            expected
        ));
    }
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Inference task failed: {}", e))?
}
