//! API models for request/response types.
//!
//! Defines the JSON request/response structures for the embedding and
//! reranker endpoints, plus the bounds every request is checked against.

use serde::{Deserialize, Serialize};

use crate::config::{Config, MAX_SENTENCES};
use crate::error::ServiceError;

/// Bounds a request must satisfy before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of sentences per request.
    pub max_sentences: usize,
    /// Maximum characters per sentence and per rerank query.
    pub max_length: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Self {
            max_sentences: MAX_SENTENCES,
            max_length: config.max_length,
        }
    }
}

impl Limits {
    fn check_sentences(&self, sentences: &[String]) -> Result<(), ServiceError> {
        if sentences.len() > self.max_sentences {
            return Err(ServiceError::Validation(format!(
                "sentences: expected at most {} items, got {}",
                self.max_sentences,
                sentences.len()
            )));
        }

        for (i, sentence) in sentences.iter().enumerate() {
            let chars = sentence.chars().count();
            if chars > self.max_length {
                return Err(ServiceError::Validation(format!(
                    "sentences[{}]: expected at most {} characters, got {}",
                    i, self.max_length, chars
                )));
            }
        }

        Ok(())
    }

    fn check_query(&self, query: &str) -> Result<(), ServiceError> {
        let chars = query.chars().count();
        if chars > self.max_length {
            return Err(ServiceError::Validation(format!(
                "query: expected at most {} characters, got {}",
                self.max_length, chars
            )));
        }
        Ok(())
    }
}

/// Request for embedding a list of sentences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The sentences to embed.
    pub sentences: Vec<String>,
}

impl EmbeddingRequest {
    pub fn validate(&self, limits: &Limits) -> Result<(), ServiceError> {
        limits.check_sentences(&self.sentences)
    }
}

/// Response carrying one vector per input sentence, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
}

/// Request for ranking sentences against a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerRequest {
    /// The query to rank sentences against.
    pub query: String,
    /// The candidate sentences.
    pub sentences: Vec<String>,
}

impl RerankerRequest {
    pub fn validate(&self, limits: &Limits) -> Result<(), ServiceError> {
        limits.check_query(&self.query)?;
        limits.check_sentences(&self.sentences)
    }
}

/// A single rerank result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Original index in the input sentences.
    pub index: usize,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Rerank response, best match first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerResponse {
    pub scores: Vec<RerankScore>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Model name.
    pub model: String,
    /// Embedding dimension.
    pub dimension: usize,
    /// Device inference runs on.
    pub device: String,
    /// Available endpoints.
    pub endpoints: Vec<String>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> Limits {
        Limits {
            max_sentences: 10,
            max_length: 16,
        }
    }

    fn sentences(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("sentence {}", i)).collect()
    }

    #[test]
    fn test_embedding_request_bounds() {
        let ok = EmbeddingRequest {
            sentences: sentences(10),
        };
        assert!(ok.validate(&limits()).is_ok());

        let empty = EmbeddingRequest { sentences: vec![] };
        assert!(empty.validate(&limits()).is_ok());

        let too_many = EmbeddingRequest {
            sentences: sentences(11),
        };
        assert!(matches!(
            too_many.validate(&limits()),
            Err(ServiceError::Validation(_))
        ));

        let too_long = EmbeddingRequest {
            sentences: vec!["x".repeat(17)],
        };
        let err = too_long.validate(&limits()).unwrap_err();
        assert!(err.to_string().contains("sentences[0]"));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 16 characters, 48 bytes
        let request = EmbeddingRequest {
            sentences: vec!["日".repeat(16)],
        };
        assert!(request.validate(&limits()).is_ok());
    }

    #[test]
    fn test_reranker_request_bounds() {
        let ok = RerankerRequest {
            query: "short".to_string(),
            sentences: sentences(2),
        };
        assert!(ok.validate(&limits()).is_ok());

        // query bound is the passage bound, not the query token budget
        let query_at_limit = RerankerRequest {
            query: "q".repeat(16),
            sentences: sentences(2),
        };
        assert!(query_at_limit.validate(&limits()).is_ok());

        let long_query = RerankerRequest {
            query: "a much longer query".to_string(),
            sentences: sentences(2),
        };
        let err = long_query.validate(&limits()).unwrap_err();
        assert!(err.to_string().starts_with("query"));

        let too_many = RerankerRequest {
            query: "q".to_string(),
            sentences: sentences(11),
        };
        assert!(too_many.validate(&limits()).is_err());
    }

    #[test]
    fn test_limits_from_config() {
        let config = Config {
            max_length: 100,
            max_query_length: 20,
            ..Config::default()
        };
        let limits = Limits::from(&config);
        assert_eq!(limits.max_sentences, MAX_SENTENCES);
        assert_eq!(limits.max_length, 100);
    }

    #[test]
    fn test_rerank_response_shape() {
        let response = RerankerResponse {
            scores: vec![RerankScore {
                index: 1,
                score: 0.5,
            }],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["scores"][0]["index"], 1);
        assert_eq!(json["scores"][0]["score"], 0.5);
    }
}
