//! HTTP request handlers for API endpoints

use axum::{
    extract::{Path, RawQuery, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use idverify::models::ComparisonReport;
use idverify::Stage;
use idverify_storage::{Record, UpsertStatus};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::types::{AnalyzeRequest, CustomerSummary, HealthResponse, SasRequest, SasResponse};
use crate::ApiState;

/// Keys the UI adds to a record for display; never persisted
const TRANSIENT_KEYS: [&str; 2] = ["photo_sas", "processedPhotoUrl"];

fn text<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Verify an uploaded ID document against the customer's stored record
pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ComparisonReport>, ApiError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.id_document.trim())
        .map_err(|e| ApiError::bad_request(Stage::Ingestion, format!("id_document is not valid base64: {e}")))?;

    info!("Analyzing document for customer {}", request.customer_id);
    info!("Document name: {}", request.id_document_name);
    info!("Document size: {} bytes", bytes.len());

    let report = state
        .pipeline
        .submit(&request.customer_id, &request.id_document_name, &bytes)
        .await
        .map_err(|e| {
            error!("Verification for customer {} failed: {}", request.customer_id, e);
            ApiError::from(e)
        })?;
    Ok(Json(report))
}

/// Ids and display names of all stored customers
pub async fn list_customers(
    State(state): State<ApiState>,
) -> Result<Json<Vec<CustomerSummary>>, ApiError> {
    let records = state.records.list(&state.partition).await?;
    let customers = records
        .iter()
        .map(|record| CustomerSummary {
            id: record.get("id").cloned().unwrap_or(Value::Null),
            name: format!("{} {}", text(record, "first_name"), text(record, "last_name"))
                .trim()
                .to_string(),
        })
        .collect();
    Ok(Json(customers))
}

/// A stored customer record
pub async fn get_customer(
    State(state): State<ApiState>,
    Path(customer_id): Path<String>,
) -> Result<Json<Record>, ApiError> {
    state
        .records
        .read(&customer_id, &state.partition)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                Stage::RecordLookup,
                "Customer not found.",
            )
        })
}

/// Insert or replace a customer record, dropping display-only keys
pub async fn update_customer(
    State(state): State<ApiState>,
    Json(mut record): Json<Record>,
) -> Result<Json<UpsertStatus>, ApiError> {
    for key in TRANSIENT_KEYS {
        record.remove(key);
    }
    let status = state.records.upsert(record).await?;
    info!("{}", status.status);
    Ok(Json(status))
}

/// Signed read URL for a blob
pub async fn get_sas(
    State(state): State<ApiState>,
    Json(request): Json<SasRequest>,
) -> Result<Json<SasResponse>, ApiError> {
    let url = request.url.replace(['\'', '"'], "");
    let sas = state.blobs.sas_url(&url, state.sas_ttl)?;
    Ok(Json(SasResponse { sas }))
}

/// Blob contents behind a signed URL issued by [`get_sas`]
pub async fn serve_blob(
    State(state): State<ApiState>,
    Path((container, blob)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    request: Request,
) -> Result<Response, ApiError> {
    let path = state
        .blobs
        .local_path(&container, &blob)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, Stage::Storage, "Blob not found."))?;

    let signed = format!("{blob}?{}", query.unwrap_or_default());
    if !state.blobs.verify_sas(&signed, chrono::Utc::now()) {
        warn!("Rejected unsigned or expired read of {}/{}", container, blob);
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            Stage::Storage,
            "invalid or expired signature",
        ));
    }

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
