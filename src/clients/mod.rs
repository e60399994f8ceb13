//! Model clients module.

pub mod hub;
pub mod local;

pub use hub::{ModelFiles, Pooling};
pub use local::{LocalEmbeddingClient, LocalModelConfig};
