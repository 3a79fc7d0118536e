//! Error taxonomy for the verification pipeline

use idverify_storage::StorageError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading and normalizing the uploaded document
    Ingestion,
    /// Language-model field extraction
    Extraction,
    /// Loading the stored customer record
    RecordLookup,
    /// Face detection and verification
    FaceMatching,
    /// Blob or record storage
    Storage,
    /// Settings and prompt loading
    Configuration,
    /// Assembling the comparison report
    Reporting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ingestion => write!(f, "ingestion"),
            Self::Extraction => write!(f, "extraction"),
            Self::RecordLookup => write!(f, "record_lookup"),
            Self::FaceMatching => write!(f, "face_matching"),
            Self::Storage => write!(f, "storage"),
            Self::Configuration => write!(f, "configuration"),
            Self::Reporting => write!(f, "reporting"),
        }
    }
}

/// Errors surfaced by the verification core
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Unsupported document format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Document ingestion failed: {0}")]
    Ingestion(String),

    #[error("Document extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Face service error: {0}")]
    FaceService(String),

    #[error("Customer record not found: {0}")]
    RecordNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O on the upload or its rasterized pages; later stages wrap their
    /// own I/O failures in their stage's variant
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VerifyError {
    /// Stage this error aborted
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::UnsupportedFormat(_) | Self::Ingestion(_) | Self::Io(_) => Stage::Ingestion,
            Self::ExtractionFailed(_) => Stage::Extraction,
            Self::FaceService(_) => Stage::FaceMatching,
            Self::RecordNotFound(_) => Stage::RecordLookup,
            Self::Storage(_) => Stage::Storage,
            Self::Config(_) => Stage::Configuration,
            Self::Json(_) => Stage::Reporting,
        }
    }

    /// Whether the caller can fix this by sending different input
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_) | Self::RecordNotFound(_))
    }
}

/// Result type for the verification core
pub type Result<T> = std::result::Result<T, VerifyError>;
