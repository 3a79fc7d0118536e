//! Face detection and verification.
//!
//! [`FaceService`] is the seam to the cloud face API ([`AzureFaceClient`]
//! talks to the Azure Face REST endpoints); [`FaceMatcher`] builds document
//! photo comparison on top of it.

pub mod azure;
pub mod matcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::VerifyError;

pub use azure::AzureFaceClient;
pub use matcher::{FaceDetection, FaceMatcher};

/// Face service call errors
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("face API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("invalid face API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for FaceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<FaceError> for VerifyError {
    fn from(e: FaceError) -> Self {
        Self::FaceService(e.to_string())
    }
}

/// Recognition quality tier reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityForRecognition {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

/// Detected face bounding box, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRectangle {
    pub top: i32,
    pub left: i32,
    pub width: u32,
    pub height: u32,
}

impl FaceRectangle {
    /// Grow the box by `buffer` pixels on every side and clamp it to a
    /// `width` x `height` image. `None` if nothing of it is left.
    #[must_use]
    pub fn outset_clamped(&self, buffer: u32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let buffer = i64::from(buffer);
        let x1 = (i64::from(self.left) - buffer).max(0);
        let y1 = (i64::from(self.top) - buffer).max(0);
        let x2 = (i64::from(self.left) + i64::from(self.width) + buffer).min(i64::from(width));
        let y2 = (i64::from(self.top) + i64::from(self.height) + buffer).min(i64::from(height));

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        // All four values are within 0..=u32::MAX after clamping.
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_for_recognition: Option<QualityForRecognition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_pose: Option<HeadPose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Value>,
}

/// One detected face, as returned by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_id: Option<String>,
    pub face_rectangle: FaceRectangle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_attributes: Option<FaceAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recognition_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_landmarks: Option<Value>,
}

impl FaceRecord {
    #[must_use]
    pub fn quality(&self) -> Option<QualityForRecognition> {
        self.face_attributes
            .as_ref()
            .and_then(|a| a.quality_for_recognition)
    }
}

/// Detection parameters sent with every detect call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectOptions {
    pub detection_model: String,
    pub recognition_model: String,
    pub return_face_id: bool,
    pub return_face_landmarks: bool,
    pub return_recognition_model: bool,
    pub attributes: Vec<String>,
    pub face_id_ttl_secs: u32,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            detection_model: "detection_03".to_string(),
            recognition_model: "recognition_04".to_string(),
            return_face_id: true,
            return_face_landmarks: true,
            return_recognition_model: true,
            attributes: vec![
                "headPose".to_string(),
                "mask".to_string(),
                "qualityForRecognition".to_string(),
            ],
            face_id_ttl_secs: 120,
        }
    }
}

/// Outcome of a face-to-face verification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceVerification {
    pub is_identical: bool,
    pub confidence: f64,
}

/// Cloud face detection and verification
#[async_trait]
pub trait FaceService: Send + Sync {
    /// Detect faces, in detector order
    async fn detect(&self, image: &[u8], options: &DetectOptions) -> Result<Vec<FaceRecord>, FaceError>;

    /// Decide whether two detected faces belong to the same person
    async fn verify(&self, face_id_1: &str, face_id_2: &str) -> Result<FaceVerification, FaceError>;
}

/// Index of the face to compare: the first rated `High`, else the first face.
///
/// `None` only for an empty slice.
#[must_use]
pub fn select_highest_quality(faces: &[FaceRecord]) -> Option<usize> {
    if faces.is_empty() {
        return None;
    }
    Some(
        faces
            .iter()
            .position(|f| f.quality() == Some(QualityForRecognition::High))
            .unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn face(quality: Option<QualityForRecognition>) -> FaceRecord {
        FaceRecord {
            face_id: Some("f".into()),
            face_rectangle: FaceRectangle::default(),
            face_attributes: Some(FaceAttributes {
                quality_for_recognition: quality,
                ..FaceAttributes::default()
            }),
            recognition_model: None,
            face_landmarks: None,
        }
    }

    #[test]
    fn test_first_high_quality_face_wins() {
        use QualityForRecognition::{High, Medium};
        let faces = vec![face(Some(Medium)), face(Some(High)), face(Some(High))];
        for _ in 0..10 {
            assert_eq!(select_highest_quality(&faces), Some(1));
        }
    }

    #[test]
    fn test_fallback_to_first_face() {
        use QualityForRecognition::{Low, Medium};
        let faces = vec![face(Some(Low)), face(None), face(Some(Medium))];
        assert_eq!(select_highest_quality(&faces), Some(0));
        assert_eq!(select_highest_quality(&[]), None);
    }

    #[test]
    fn test_face_record_from_service_json() {
        let record: FaceRecord = serde_json::from_value(json!({
            "faceId": "c5c24a82-6845-4031-9d5d-978df9175426",
            "recognitionModel": "recognition_04",
            "faceRectangle": {"width": 78, "height": 78, "left": 394, "top": 54},
            "faceAttributes": {
                "headPose": {"pitch": 0.0, "roll": -1.1, "yaw": 3.2},
                "mask": {"type": "noMask", "noseAndMouthCovered": false},
                "qualityForRecognition": "high"
            }
        }))
        .unwrap();
        assert_eq!(record.quality(), Some(QualityForRecognition::High));
        assert_eq!(record.face_rectangle.left, 394);
    }

    #[test]
    fn test_outset_is_clamped_to_image() {
        let rect = FaceRectangle {
            top: 5,
            left: 90,
            width: 20,
            height: 20,
        };
        assert_eq!(rect.outset_clamped(10, 100, 100), Some((80, 0, 20, 35)));

        let outside = FaceRectangle {
            top: 500,
            left: 500,
            width: 10,
            height: 10,
        };
        assert_eq!(outside.outset_clamped(10, 100, 100), None);
    }
}
