//! Handler tests against in-memory stores and offline fakes
//!
//! Most handlers are called directly; the body limit and blob serving go
//! through the full router. None of these requests reach a language model
//! or face service.

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::{Json, Router};
use base64::Engine;
use idverify::config::Settings;
use idverify::face::{DetectOptions, FaceError, FaceRecord, FaceService, FaceVerification};
use idverify::ingest::PageRasterizer;
use idverify::llm::{CompletionRequest, LanguageModel, LlmError};
use idverify::prompts::PromptTemplates;
use idverify::{Services, Stage};
use idverify_api::{
    analyze, build_router, get_customer, get_sas, health_check, list_customers, update_customer,
    AnalyzeRequest, ApiState, CustomerSummary, SasRequest,
};
use idverify_storage::{BlobConfig, BlobStore, LocalBlobStore, MemoryRecordStore, Record, RecordStore};
use serde_json::{json, Value};
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Default)]
struct Offline {
    calls: AtomicUsize,
}

#[async_trait]
impl LanguageModel for Offline {
    async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LlmError::Timeout)
    }
}

#[async_trait]
impl FaceService for Offline {
    async fn detect(&self, _image: &[u8], _options: &DetectOptions) -> Result<Vec<FaceRecord>, FaceError> {
        Err(FaceError::Timeout)
    }

    async fn verify(&self, _a: &str, _b: &str) -> Result<FaceVerification, FaceError> {
        Err(FaceError::Timeout)
    }
}

struct NoPdf;

impl PageRasterizer for NoPdf {
    fn rasterize(&self, _pdf_path: &FsPath, _dpi: u32) -> idverify::Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }
}

struct Fixture {
    _dir: TempDir,
    state: ApiState,
    model: Arc<Offline>,
    records: Arc<MemoryRecordStore>,
    blobs: Arc<LocalBlobStore>,
}

fn object(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

fn fixture() -> Fixture {
    fixture_with(|_| {})
}

fn fixture_with(configure: impl FnOnce(&mut Settings)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.pipeline.work_dir = dir.path().join("work");
    settings.pipeline.sas_ttl_secs = 600;
    settings.storage.blob = BlobConfig {
        root: dir.path().join("blobs"),
        account_key: "api-test-key".to_string(),
        ..BlobConfig::default()
    };
    configure(&mut settings);

    let model = Arc::new(Offline::default());
    let records = Arc::new(MemoryRecordStore::new());
    let blobs = Arc::new(LocalBlobStore::new(settings.storage.blob.clone()).unwrap());
    let services = Services {
        language_model: model.clone(),
        face_service: Arc::new(Offline::default()),
        blobs: blobs.clone(),
        records: records.clone(),
        rasterizer: Arc::new(NoPdf),
    };

    Fixture {
        state: ApiState::new(services, &settings, PromptTemplates::default()),
        _dir: dir,
        model,
        records,
        blobs,
    }
}

async fn seed(records: &MemoryRecordStore) {
    for record in [
        json!({"id": "c-2", "first_name": "Jane", "last_name": "Roe"}),
        json!({"id": "c-1", "first_name": "John", "last_name": "Doe", "address": "1 Main St"}),
        json!({"id": "c-3", "last_name": "Solo"}),
    ] {
        records.upsert(object(record)).await.unwrap();
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let Json(health) = health_check().await;
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[tokio::test]
async fn test_list_customers() {
    let f = fixture();
    seed(&f.records).await;

    let Json(customers) = list_customers(State(f.state.clone())).await.unwrap();

    assert_eq!(
        customers,
        vec![
            CustomerSummary {
                id: json!("c-1"),
                name: "John Doe".into()
            },
            CustomerSummary {
                id: json!("c-2"),
                name: "Jane Roe".into()
            },
            CustomerSummary {
                id: json!("c-3"),
                name: "Solo".into()
            },
        ]
    );
}

#[tokio::test]
async fn test_get_customer() {
    let f = fixture();
    seed(&f.records).await;

    let Json(record) = get_customer(State(f.state.clone()), Path("c-1".to_string()))
        .await
        .unwrap();
    assert_eq!(record["address"], "1 Main St");

    let err = get_customer(State(f.state.clone()), Path("c-404".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::NOT_FOUND);
    assert_eq!(err.stage, Stage::RecordLookup);
}

#[tokio::test]
async fn test_update_drops_display_only_keys() {
    let f = fixture();
    seed(&f.records).await;

    let body = object(json!({
        "id": "c-1",
        "first_name": "John",
        "last_name": "Doe",
        "address": "2 Side Ave",
        "photo_sas": "http://localhost:8000/blobs/kyc-documents/p.png?sig=abc",
        "processedPhotoUrl": "http://localhost:8000/blobs/kyc-documents/q.png"
    }));
    let Json(status) = update_customer(State(f.state.clone()), Json(body))
        .await
        .unwrap();
    assert_eq!(status.id, "c-1");

    let stored = f.records.read("c-1", "customers").await.unwrap().unwrap();
    assert_eq!(stored["address"], "2 Side Ave");
    assert!(!stored.contains_key("photo_sas"));
    assert!(!stored.contains_key("processedPhotoUrl"));
}

#[tokio::test]
async fn test_update_without_id_is_rejected() {
    let f = fixture();
    let err = update_customer(State(f.state.clone()), Json(object(json!({"first_name": "X"}))))
        .await
        .unwrap_err();
    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.stage, Stage::Storage);
}

#[tokio::test]
async fn test_get_sas_strips_quotes_and_signs() {
    let f = fixture();
    let url = f.blobs.upload_bytes("id.png", b"png").await.unwrap();

    let request = SasRequest {
        url: format!("\"{url}\""),
    };
    let Json(response) = get_sas(State(f.state.clone()), Json(request)).await.unwrap();

    assert!(response.sas.starts_with(&url));
    assert!(f.blobs.verify_sas(&response.sas, chrono::Utc::now()));
}

#[tokio::test]
async fn test_analyze_rejects_invalid_base64() {
    let f = fixture();
    let request = AnalyzeRequest {
        customer_id: "c-1".into(),
        id_document: "not base64!".into(),
        id_document_name: "id.png".into(),
    };

    let err = analyze(State(f.state.clone()), Json(request)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.stage, Stage::Ingestion);
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_analyze_unsupported_format() {
    let f = fixture();
    seed(&f.records).await;
    let request = AnalyzeRequest {
        customer_id: "c-1".into(),
        id_document: "SGVsbG8=".into(),
        id_document_name: "id.docx".into(),
    };

    let err = analyze(State(f.state.clone()), Json(request)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(err.stage, Stage::Ingestion);
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_analyze_pdf_without_pages() {
    let f = fixture();
    seed(&f.records).await;
    let request = AnalyzeRequest {
        customer_id: "c-1".into(),
        id_document: "JVBERg==".into(),
        id_document_name: "id.pdf".into(),
    };

    let err = analyze(State(f.state.clone()), Json(request)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_REQUEST);
    assert_eq!(err.stage, Stage::Ingestion);
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_analyze_extraction_failure_is_bad_gateway() {
    let f = fixture();
    seed(&f.records).await;
    let request = AnalyzeRequest {
        customer_id: "c-1".into(),
        id_document: "SGVsbG8=".into(),
        id_document_name: "id.png".into(),
    };

    let err = analyze(State(f.state.clone()), Json(request)).await.unwrap_err();

    assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    assert_eq!(err.stage, Stage::Extraction);
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Through the router
// ---------------------------------------------------------------------------

fn router(f: &Fixture) -> Router {
    build_router(f.state.clone())
}

async fn post_analyze(app: Router, document: &[u8], name: &str) -> Response {
    let body = json!({
        "customer_id": "c-1",
        "id_document": base64::engine::general_purpose::STANDARD.encode(document),
        "id_document_name": name,
    });
    let request = Request::post("/api/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

/// Path and query of a blob URL, as the browser requests it
fn local_uri(url: &str) -> &str {
    url.strip_prefix("http://localhost:8000").unwrap()
}

#[tokio::test]
async fn test_scanned_document_larger_than_two_megabytes_is_accepted() {
    let f = fixture();
    seed(&f.records).await;
    let document = vec![0x5a_u8; 2_400_000];

    let response = post_analyze(router(&f), &document, "id.docx").await;

    // gets past the body limit to the format check
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let error: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(error["stage"], "ingestion");
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_body_over_configured_limit_is_rejected() {
    let f = fixture_with(|s| s.pipeline.max_request_bytes = 64 * 1024);
    seed(&f.records).await;

    let response = post_analyze(router(&f), &vec![0_u8; 100 * 1024], "id.png").await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(f.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_signed_blob_url_serves_the_file() {
    let f = fixture();
    let url = f.blobs.upload_bytes("id.png", b"png bytes").await.unwrap();
    let sas = f.blobs.sas_url(&url, Duration::from_secs(600)).unwrap();

    let response = get(router(&f), local_uri(&sas)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"png bytes");
}

#[tokio::test]
async fn test_expired_blob_url_is_forbidden() {
    let f = fixture();
    let url = f.blobs.upload_bytes("id.png", b"png bytes").await.unwrap();
    let sas = f.blobs.sas_url(&url, Duration::ZERO).unwrap();

    let response = get(router(&f), local_uri(&sas)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(error["stage"], "storage");
}

#[tokio::test]
async fn test_tampered_or_missing_signature_is_forbidden() {
    let f = fixture();
    let url = f.blobs.upload_bytes("id.png", b"png bytes").await.unwrap();
    let other = f.blobs.upload_bytes("other.png", b"secret").await.unwrap();
    let sas = f.blobs.sas_url(&url, Duration::from_secs(600)).unwrap();

    let (_, sig) = sas.split_once("sig=").unwrap();
    let flipped = if sig.starts_with('0') { "1" } else { "0" };
    let tampered = format!("{}sig={flipped}{}", &sas[..sas.len() - sig.len() - 4], &sig[1..]);
    let response = get(router(&f), local_uri(&tampered)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // a valid signature for one blob does not open another
    let (_, query) = sas.split_once('?').unwrap();
    let borrowed = format!("{}?{query}", local_uri(&other));
    let response = get(router(&f), &borrowed).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = get(router(&f), local_uri(&url)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_blob_outside_container_is_not_found() {
    let f = fixture();
    let url = f.blobs.upload_bytes("id.png", b"png bytes").await.unwrap();
    let sas = f.blobs.sas_url(&url, Duration::from_secs(600)).unwrap();

    let uri = local_uri(&sas).replace("/kyc-documents/", "/other-container/");
    let response = get(router(&f), &uri).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
