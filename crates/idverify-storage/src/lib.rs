//! Storage layer for the identity verification service
//!
//! This crate provides the two external stores the verification core talks to:
//! - **Blob storage**: uploaded ID documents, annotated and cropped face images,
//!   and time-boxed signed (SAS) URLs for reading them back
//! - **Record storage**: the canonical customer record, keyed by customer id and
//!   partitioned by category
//!
//! Both stores sit behind async traits so the core can be driven against the
//! local implementations here or any other backend.
//!
//! # Example
//!
//! ```rust,no_run
//! use idverify_storage::{BlobConfig, BlobStore, LocalBlobStore};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = LocalBlobStore::new(BlobConfig::default())?;
//!
//!     let url = store.upload(Path::new("passport.png")).await?;
//!     let sas = store.sas_url(&url, Duration::from_secs(3600))?;
//!     println!("{sas}");
//!
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod blob;
pub mod record;

pub use blob::{BlobConfig, BlobStore, LocalBlobStore};
pub use record::{
    JsonFileRecordStore, MemoryRecordStore, Record, RecordStore, UpsertStatus,
    DEFAULT_PARTITION,
};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for both backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Blob storage configuration
    #[serde(default)]
    pub blob: BlobConfig,

    /// Root directory for the JSON-file record store
    #[serde(default = "record::default_records_root")]
    pub records_root: std::path::PathBuf,

    /// Partition (category id) customer records live in
    #[serde(default = "record::default_partition")]
    pub partition: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob: BlobConfig::default(),
            records_root: record::default_records_root(),
            partition: record::default_partition(),
        }
    }
}
