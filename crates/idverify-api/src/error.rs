//! Mapping of pipeline and storage failures onto HTTP responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use idverify::{Stage, VerifyError};
use idverify_storage::StorageError;

use crate::types::ErrorResponse;

/// An error response: status code, message and failing stage
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub stage: Stage,
}

impl ApiError {
    pub fn new(status: StatusCode, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            stage,
        }
    }

    pub fn bad_request(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, stage, message)
    }
}

fn storage_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::InvalidReference(_) | StorageError::InvalidRecord(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        let status = match &err {
            VerifyError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            VerifyError::Storage(inner) => storage_status(inner),
            _ => match err.stage() {
                Stage::Ingestion => StatusCode::BAD_REQUEST,
                Stage::Extraction | Stage::FaceMatching => StatusCode::BAD_GATEWAY,
                Stage::RecordLookup => StatusCode::NOT_FOUND,
                Stage::Storage | Stage::Configuration | Stage::Reporting => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        };
        Self::new(status, err.stage(), err.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::new(storage_status(&err), Stage::Storage, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
            stage: self.stage.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}
