//! The comparison report handed back to callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::face::FaceRecord;

pub const NO_FACES_ERROR: &str = "Please provide images with at least one photo.";
pub const NO_RECORD_PHOTO_ERROR: &str = "No photo on record.";

/// Result of comparing the document photo with the photo on record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceVerifyResult {
    #[serde(rename = "isIdentical")]
    pub is_identical: bool,
    /// Passed through from the face service unchanged; `-1` when no
    /// comparison was possible
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FaceVerifyResult {
    /// Degenerate result for a comparison that could not be made
    #[must_use]
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self {
            is_identical: false,
            confidence: -1.0,
            photo_1: None,
            photo_2: None,
            error: Some(message.into()),
        }
    }

    /// Either image had no detectable face
    #[must_use]
    pub fn no_faces() -> Self {
        Self::degenerate(NO_FACES_ERROR)
    }

    /// The stored record carries no photo to compare against
    #[must_use]
    pub fn no_record_photo() -> Self {
        Self::degenerate(NO_RECORD_PHOTO_ERROR)
    }

    /// Photos match: no error and the service judged them identical
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.error.is_none() && self.is_identical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Success,
    Error,
}

/// One line of the operator-facing check log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub message: String,
}

impl LogEntry {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            log_type: LogType::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            log_type: LogType::Error,
            message: message.into(),
        }
    }
}

/// Faces found on the submitted document itself.
///
/// Empty unless document-photo analysis is enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentVisualAnalysis {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub face_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faces: Vec<FaceRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotated_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cropped_face: Option<String>,
}

impl DocumentVisualAnalysis {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.face_ids.is_empty()
            && self.faces.is_empty()
            && self.annotated_images.is_empty()
            && self.cropped_face.is_none()
    }
}

/// Everything the pipeline learned about one submitted document.
///
/// A flat value: it holds no references into pipeline state and
/// serializes losslessly, with map and log order preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Field name to serialized check, in evaluation order
    pub data_fields_checks: Map<String, Value>,
    /// The extracted document, every schema field present
    pub document_id_extracted_data: Map<String, Value>,
    #[serde(default)]
    pub document_visual_analysis: DocumentVisualAnalysis,
    pub data_fields_status: bool,
    pub photo_comparison_result: FaceVerifyResult,
    pub photo_comparison_status: bool,
    pub log_checks: Vec<LogEntry>,
}
