//! API request and response types

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Document verification request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Id of the stored customer record to verify against
    #[serde(default)]
    pub customer_id: String,
    /// Base64-encoded document bytes
    #[serde(default)]
    pub id_document: String,
    /// Original file name; its extension selects the document format
    #[serde(default)]
    pub id_document_name: String,
}

/// One entry of the customer list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub id: serde_json::Value,
    /// `"{first_name} {last_name}"`, trimmed
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SasRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SasResponse {
    pub sas: String,
}

/// Body of every error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Pipeline stage that failed
    pub stage: String,
}
