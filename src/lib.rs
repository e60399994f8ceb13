//! Sentence-transformers service - Library Entry Point
//!
//! Serves dense embeddings and embedding-based reranking from a single
//! local ONNX model over HTTP.

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use clients::{LocalEmbeddingClient, LocalModelConfig};
pub use config::Config;
pub use error::ServiceError;
pub use services::ModelService;
pub use traits::{Device, SearchHit, SentenceEncoder};
