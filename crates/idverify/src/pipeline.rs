//! The verification pipeline: ingest, extract, reconcile and match, aggregate.

use idverify_storage::{BlobStore, JsonFileRecordStore, LocalBlobStore, Record, RecordStore};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::aggregate::aggregate;
use crate::config::Settings;
use crate::error::{Result, VerifyError};
use crate::extract::StructuredExtractor;
use crate::face::{AzureFaceClient, DetectOptions, FaceMatcher, FaceService};
use crate::ingest::{DocumentIngestor, IngestedDocument, PageRasterizer, PdfiumRasterizer};
use crate::llm::{LanguageModel, OpenAIClient};
use crate::models::{ComparisonReport, DocumentVisualAnalysis, FaceVerifyResult, IdDocument};
use crate::prompts::PromptTemplates;
use crate::reconcile::{FieldReconciler, LlmFieldComparator};

const PHOTO_KEY: &str = "photo";

/// External collaborators the pipeline is wired to
#[derive(Clone)]
pub struct Services {
    pub language_model: Arc<dyn LanguageModel>,
    pub face_service: Arc<dyn FaceService>,
    pub blobs: Arc<dyn BlobStore>,
    pub records: Arc<dyn RecordStore>,
    pub rasterizer: Arc<dyn PageRasterizer>,
}

impl Services {
    /// Production services built from settings
    ///
    /// # Errors
    /// Returns an error if a client cannot be constructed or a storage
    /// directory cannot be created.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let language_model = OpenAIClient::new(settings.llm.clone())
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        let face_service =
            AzureFaceClient::new(&settings.face).map_err(|e| VerifyError::Config(e.to_string()))?;
        let blobs = LocalBlobStore::new(settings.storage.blob.clone())?;
        let records = JsonFileRecordStore::new(&settings.storage.records_root)?;

        Ok(Self {
            language_model: Arc::new(language_model),
            face_service: Arc::new(face_service),
            blobs: Arc::new(blobs),
            records: Arc::new(records),
            rasterizer: Arc::new(PdfiumRasterizer),
        })
    }
}

/// Runs one verification request end to end
#[derive(Clone)]
pub struct VerificationPipeline {
    ingestor: DocumentIngestor,
    extractor: StructuredExtractor,
    reconciler: FieldReconciler,
    matcher: FaceMatcher,
    records: Arc<dyn RecordStore>,
    partition: String,
    work_dir: PathBuf,
    analyze_document_photo: bool,
}

impl std::fmt::Debug for VerificationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationPipeline")
            .field("partition", &self.partition)
            .field("work_dir", &self.work_dir)
            .field("analyze_document_photo", &self.analyze_document_photo)
            .finish_non_exhaustive()
    }
}

/// File name to store an upload under: its final path component only
fn upload_file_name(document_name: &str) -> String {
    Path::new(document_name.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("document")
        .to_string()
}

fn record_photo(record: &Record) -> Option<&str> {
    record
        .get(PHOTO_KEY)
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
}

impl VerificationPipeline {
    /// Wire a pipeline from services, settings and prompt templates
    pub fn new(services: Services, settings: &Settings, prompts: PromptTemplates) -> Self {
        let work_dir = settings.pipeline.work_dir.clone();
        let options = DetectOptions {
            face_id_ttl_secs: settings.face.face_id_ttl_secs,
            ..DetectOptions::default()
        };

        Self {
            ingestor: DocumentIngestor::new(
                services.rasterizer,
                &work_dir,
                settings.pipeline.pdf_dpi,
            ),
            extractor: StructuredExtractor::new(
                Arc::clone(&services.language_model),
                Arc::clone(&services.blobs),
                prompts.extraction.clone(),
            ),
            reconciler: FieldReconciler::new(Arc::new(LlmFieldComparator::new(
                services.language_model,
                prompts,
            ))),
            matcher: FaceMatcher::new(services.face_service, services.blobs, &work_dir)
                .with_buffer(settings.face.buffer)
                .with_options(options),
            records: services.records,
            partition: settings.storage.partition.clone(),
            work_dir,
            analyze_document_photo: settings.pipeline.analyze_document_photo,
        }
    }

    /// Production pipeline from settings alone
    ///
    /// # Errors
    /// Returns an error if services or prompt overrides cannot be loaded.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let prompts = PromptTemplates::load(settings.pipeline.prompt_dir.as_deref())?;
        Ok(Self::new(Services::from_settings(settings)?, settings, prompts))
    }

    /// Replace the field reconciler (e.g. to plug in another comparator)
    #[must_use]
    pub fn with_reconciler(mut self, reconciler: FieldReconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    #[must_use]
    pub fn face_matcher(&self) -> &FaceMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn extractor(&self) -> &StructuredExtractor {
        &self.extractor
    }

    /// Verify an uploaded document against the stored record of `customer_id`.
    ///
    /// The upload is written to a scratch directory that is removed when this
    /// returns, whatever the outcome.
    ///
    /// # Errors
    /// Fails with the error of the first stage that cannot complete:
    /// ingestion, extraction, record lookup, face matching or storage.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn submit(
        &self,
        customer_id: &str,
        document_name: &str,
        bytes: &[u8],
    ) -> Result<ComparisonReport> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("request-")
            .tempdir_in(&self.work_dir)?;

        let path = scratch.path().join(upload_file_name(document_name));
        tokio::fs::write(&path, bytes).await?;

        let report = self.analyze_path(customer_id, &path).await;
        drop(scratch);
        report
    }

    /// Run the pipeline on a document already on disk
    ///
    /// # Errors
    /// As for [`Self::submit`].
    pub async fn analyze_path(&self, customer_id: &str, path: &Path) -> Result<ComparisonReport> {
        let document = self.ingest(path).await?;
        let mut extracted = self.extract(&document).await?;

        let record = self
            .records
            .read(customer_id, &self.partition)
            .await?
            .ok_or_else(|| VerifyError::RecordNotFound(customer_id.to_string()))?;
        info!("Loaded record {}/{}", self.partition, customer_id);

        let visual_analysis = if self.analyze_document_photo {
            let analysis = self.matcher.analyze_document(document.pages()).await?;
            if let Some(cropped) = &analysis.cropped_face {
                extracted.photo = Some(cropped.clone());
            }
            analysis
        } else {
            DocumentVisualAnalysis::default()
        };

        let (checks, face_result) = tokio::join!(
            self.reconciler.reconcile(&extracted, &record),
            self.compare_photos(&document, &record)
        );

        let report = aggregate(&checks, face_result?, &extracted, visual_analysis)?;
        info!(
            "Customer {}: data_fields_status={} photo_comparison_status={}",
            customer_id, report.data_fields_status, report.photo_comparison_status
        );
        Ok(report)
    }

    /// Ingest on the blocking pool; rasterization is CPU-bound
    async fn ingest(&self, path: &Path) -> Result<IngestedDocument> {
        let ingestor = self.ingestor.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || ingestor.normalize(&path))
            .await
            .map_err(|e| VerifyError::Ingestion(format!("ingestion task failed: {e}")))?
    }

    async fn extract(&self, document: &IngestedDocument) -> Result<IdDocument> {
        self.extractor
            .process_document(document.source(), document.pages())
            .await
    }

    async fn compare_photos(
        &self,
        document: &IngestedDocument,
        record: &Record,
    ) -> Result<FaceVerifyResult> {
        let Some(stored_photo) = record_photo(record) else {
            info!("Stored record has no photo");
            return Ok(FaceVerifyResult::no_record_photo());
        };
        let Some(first_page) = document.first_page() else {
            return Ok(FaceVerifyResult::no_faces());
        };
        self.matcher
            .compare_document_photos(&first_page.to_string_lossy(), stored_photo)
            .await
    }
}
