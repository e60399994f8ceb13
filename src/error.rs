//! Service error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Which operation an inference failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Embedding,
    Rerank,
}

impl Operation {
    fn code(self) -> &'static str {
        match self {
            Operation::Embedding => "EMBEDDING_FAILED",
            Operation::Rerank => "RERANK_FAILED",
        }
    }
}

/// Errors surfaced by the model service to HTTP callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request violates field constraints. The model is never invoked.
    #[error("{0}")]
    Validation(String),

    /// Any failure from the model or the device it runs on.
    #[error("{operation:?} failed: {source:#}")]
    Inference {
        operation: Operation,
        #[source]
        source: anyhow::Error,
    },
}

impl ServiceError {
    pub fn inference(operation: Operation, source: anyhow::Error) -> Self {
        ServiceError::Inference { operation, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Inference { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_FAILED",
            ServiceError::Inference { operation, .. } => operation.code(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: match &self {
                ServiceError::Validation(msg) => msg.clone(),
                ServiceError::Inference { .. } => "Internal Server Error".to_string(),
            },
            code: self.code().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
