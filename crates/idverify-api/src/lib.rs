//! REST API server for ID document verification
//!
//! Routes:
//! - `GET  /health`
//! - `POST /api/analyze` verify a base64 document against a customer record
//! - `GET  /api/customers`, `GET /api/customer/{id}`, `POST /api/update`
//! - `POST /api/get_sas` signed read URL for a stored blob
//! - `GET  /blobs/{container}/{blob}` blob contents for a valid signed URL
//!
//! Request bodies are capped at `pipeline.max_request_bytes`.

mod error;
mod handlers;
mod types;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use idverify::config::Settings;
use idverify::prompts::PromptTemplates;
use idverify::{Services, VerificationPipeline};
use idverify_storage::{BlobStore, RecordStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::*;
pub use types::*;

/// API server state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<VerificationPipeline>,
    pub records: Arc<dyn RecordStore>,
    pub blobs: Arc<dyn BlobStore>,
    /// Record partition customers live in
    pub partition: String,
    /// Lifetime of issued SAS URLs
    pub sas_ttl: Duration,
    /// Request body cap
    pub max_request_bytes: usize,
}

impl ApiState {
    /// State over explicit services
    #[must_use]
    pub fn new(services: Services, settings: &Settings, prompts: PromptTemplates) -> Self {
        let records = Arc::clone(&services.records);
        let blobs = Arc::clone(&services.blobs);
        Self {
            pipeline: Arc::new(VerificationPipeline::new(services, settings, prompts)),
            records,
            blobs,
            partition: settings.storage.partition.clone(),
            sas_ttl: Duration::from_secs(settings.pipeline.sas_ttl_secs),
            max_request_bytes: settings.pipeline.max_request_bytes,
        }
    }

    /// Production state from settings
    ///
    /// # Errors
    /// Returns an error if a client, store or prompt override cannot be loaded.
    pub fn from_settings(settings: &Settings) -> idverify::Result<Self> {
        let prompts = PromptTemplates::load(settings.pipeline.prompt_dir.as_deref())?;
        Ok(Self::new(Services::from_settings(settings)?, settings, prompts))
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: ApiState) -> Router {
    let body_limit = state.max_request_bytes;
    Router::new()
        .route("/health", get(health_check))
        .route("/api/analyze", post(analyze))
        .route("/api/customers", get(list_customers))
        .route("/api/customer/{customer_id}", get(get_customer))
        .route("/api/update", post(update_customer))
        .route("/api/get_sas", post(get_sas))
        .route("/blobs/{container}/{blob}", get(serve_blob))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    tracing::info!("Starting API server on {}", addr);

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
