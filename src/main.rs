//! Sentence-transformers service - Main Entry Point
//!
//! Loads one embedding model at startup and serves `/embedding` and
//! `/reranker` over HTTP.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use st_server::clients::{hub, LocalEmbeddingClient, LocalModelConfig};
use st_server::config::Config;
use st_server::handlers::{self, AppState};
use st_server::services::ModelService;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "st_server=info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("🚀 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("📦 Model: {}", config.model_name);
    info!(
        "🔧 Batch size: {}, max length: {}, max query length: {}",
        config.batch_size, config.max_length, config.max_query_length
    );

    // Resolve and load the model off the async executor
    let model_name = config.model_name.clone();
    let device = config.device;
    let client = tokio::task::spawn_blocking(move || {
        let files = hub::resolve(&model_name)?;
        LocalEmbeddingClient::new(LocalModelConfig {
            model_name,
            files,
            device,
        })
    })
    .await
    .context("Model loading task failed")?;

    let client = match client {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to load model {}: {:#}", config.model_name, e);
            return Err(e);
        }
    };

    let service = ModelService::new(client, &config);
    info!(
        "✅ Model loaded: {} ({}D) on {}",
        service.model_name(),
        service.dimension(),
        service.device()
    );

    let addr = config.bind_addr();
    let app = handlers::router(Arc::new(AppState::new(service, config)));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("✅ Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
