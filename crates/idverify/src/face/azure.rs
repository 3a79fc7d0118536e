//! Azure Face REST client

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{DetectOptions, FaceError, FaceRecord, FaceService, FaceVerification};
use crate::config::FaceSettings;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    face_id1: &'a str,
    face_id2: &'a str,
}

/// Client for the `/face/v1.0` detect and verify endpoints
#[derive(Debug, Clone)]
pub struct AzureFaceClient {
    http_client: Client,
    endpoint: String,
    api_key: String,
}

impl AzureFaceClient {
    /// Create a client with the configured timeout
    ///
    /// # Errors
    /// Returns an error if no endpoint is configured or the HTTP client
    /// cannot be built.
    pub fn new(settings: &FaceSettings) -> Result<Self, FaceError> {
        if settings.endpoint.is_empty() {
            return Err(FaceError::Transport(
                "face endpoint is not configured (FACE_API_ENDPOINT)".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| FaceError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn url(&self, operation: &str) -> String {
        format!("{}/face/v1.0/{operation}", self.endpoint)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FaceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(FaceError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

/// Query string for a detect call
pub(crate) fn detect_query(options: &DetectOptions) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("detectionModel", options.detection_model.clone()),
        ("recognitionModel", options.recognition_model.clone()),
        ("returnFaceId", options.return_face_id.to_string()),
        ("returnFaceLandmarks", options.return_face_landmarks.to_string()),
        (
            "returnRecognitionModel",
            options.return_recognition_model.to_string(),
        ),
        ("faceIdTimeToLive", options.face_id_ttl_secs.to_string()),
    ];
    if !options.attributes.is_empty() {
        query.push(("returnFaceAttributes", options.attributes.join(",")));
    }
    query
}

#[async_trait]
impl FaceService for AzureFaceClient {
    async fn detect(&self, image: &[u8], options: &DetectOptions) -> Result<Vec<FaceRecord>, FaceError> {
        let response = self
            .http_client
            .post(self.url("detect"))
            .query(&detect_query(options))
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let faces: Vec<FaceRecord> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FaceError::InvalidResponse(e.to_string()))?;

        debug!("Detected {} face(s) in {} bytes", faces.len(), image.len());
        Ok(faces)
    }

    async fn verify(&self, face_id_1: &str, face_id_2: &str) -> Result<FaceVerification, FaceError> {
        let response = self
            .http_client
            .post(self.url("verify"))
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .json(&VerifyRequest {
                face_id1: face_id_1,
                face_id2: face_id_2,
            })
            .send()
            .await?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FaceError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_endpoint() {
        assert!(AzureFaceClient::new(&FaceSettings::default()).is_err());
    }

    #[test]
    fn test_urls() {
        let settings = FaceSettings {
            endpoint: "https://face.example.com/".into(),
            ..FaceSettings::default()
        };
        let client = AzureFaceClient::new(&settings).unwrap();
        assert_eq!(client.url("detect"), "https://face.example.com/face/v1.0/detect");
    }

    #[test]
    fn test_detect_query_defaults() {
        let query = detect_query(&DetectOptions::default());
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("detectionModel"), Some("detection_03"));
        assert_eq!(get("recognitionModel"), Some("recognition_04"));
        assert_eq!(get("returnFaceId"), Some("true"));
        assert_eq!(get("faceIdTimeToLive"), Some("120"));
        assert_eq!(
            get("returnFaceAttributes"),
            Some("headPose,mask,qualityForRecognition")
        );
    }

    #[test]
    fn test_verify_request_keys() {
        let body = serde_json::to_value(VerifyRequest {
            face_id1: "a",
            face_id2: "b",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"faceId1": "a", "faceId2": "b"}));
    }
}
