//! Services module.

pub mod model_service;
pub mod vector_ops;

pub use model_service::ModelService;
pub use vector_ops::VectorOps;
