//! HTTP handlers module.
//!
//! Provides the embedding and reranker endpoints backed by the shared model.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Operation, ServiceError};
use crate::models::{
    EmbeddingRequest, EmbeddingResponse, HealthResponse, Limits, RerankerRequest,
    RerankerResponse,
};
use crate::services::ModelService;

/// Application state shared across handlers.
pub struct AppState {
    pub service: ModelService,
    pub limits: Limits,
    pub config: Config,
}

impl AppState {
    pub fn new(service: ModelService, config: Config) -> Self {
        Self {
            limits: Limits::from(&config),
            service,
            config,
        }
    }
}

/// Build the HTTP router with middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/embedding", post(embedding))
        .route("/reranker", post(reranker))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.service.model_name().to_string(),
        dimension: state.service.dimension(),
        device: state.service.device().to_string(),
        endpoints: vec![
            "/health".to_string(),
            "/embedding".to_string(),
            "/reranker".to_string(),
        ],
    })
}

/// Body that could not be read as the expected JSON shape.
fn rejected(rejection: JsonRejection) -> ServiceError {
    ServiceError::Validation(rejection.body_text())
}

/// Embed a list of sentences.
pub async fn embedding(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<Json<EmbeddingResponse>, ServiceError> {
    let Json(request) = payload.map_err(rejected)?;
    request.validate(&state.limits)?;
    info!("Embedding {} sentences", request.sentences.len());

    match state.service.embed(request.sentences).await {
        Ok(vectors) => Ok(Json(EmbeddingResponse { vectors })),
        Err(e) => {
            error!("Embedding failed: {:#}", e);
            Err(ServiceError::inference(Operation::Embedding, e))
        }
    }
}

/// Rank sentences against a query.
pub async fn reranker(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RerankerRequest>, JsonRejection>,
) -> Result<Json<RerankerResponse>, ServiceError> {
    let Json(request) = payload.map_err(rejected)?;
    request.validate(&state.limits)?;
    info!("Reranking {} sentences", request.sentences.len());

    match state.service.rerank(request.query, request.sentences).await {
        Ok(scores) => Ok(Json(RerankerResponse { scores })),
        Err(e) => {
            error!("Rerank failed: {:#}", e);
            Err(ServiceError::inference(Operation::Rerank, e))
        }
    }
}
