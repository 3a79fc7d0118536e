//! Structured extraction of ID document fields from page images.

use idverify_storage::BlobStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, VerifyError};
use crate::llm::{complete_structured, ImageInput, LanguageModel};
use crate::models::IdDocument;
use crate::prompts::render;

const DOCUMENT_EXPLANATION: &str = "Please check attached image.";
const NOTHING_EXTRACTED: &str = "No extracted information.";

/// Turns page images into an [`IdDocument`] with one language-model call
#[derive(Clone)]
pub struct StructuredExtractor {
    model: Arc<dyn LanguageModel>,
    blobs: Arc<dyn BlobStore>,
    prompt_template: String,
}

impl std::fmt::Debug for StructuredExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredExtractor").finish_non_exhaustive()
    }
}

impl StructuredExtractor {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        blobs: Arc<dyn BlobStore>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            model,
            blobs,
            prompt_template: prompt_template.into(),
        }
    }

    /// Extract a document from all page images in a single call.
    ///
    /// # Errors
    /// `ExtractionFailed` on transport errors, API errors, empty replies or
    /// replies that do not conform to the document schema.
    pub async fn extract(&self, images: &[PathBuf], prompt_template: &str) -> Result<IdDocument> {
        let prompt = render(
            prompt_template,
            &[("document", DOCUMENT_EXPLANATION), ("extracted", NOTHING_EXTRACTED)],
        );

        let mut inputs = Vec::with_capacity(images.len());
        for path in images {
            inputs.push(ImageInput::from_path(path).map_err(|e| {
                VerifyError::ExtractionFailed(format!("failed to read page {}: {e}", path.display()))
            })?);
        }
        debug!(
            "Submitting {} page image(s), {} bytes total",
            inputs.len(),
            inputs.iter().map(|i| i.data.len()).sum::<usize>()
        );

        let document: IdDocument = complete_structured(self.model.as_ref(), &prompt, &inputs)
            .await
            .map_err(|e| VerifyError::ExtractionFailed(e.to_string()))?;

        info!("Extracted {} from {} page(s)", document.document_type, images.len());
        Ok(document)
    }

    /// Extract with the configured template, then upload the source file and
    /// record its reference in `file_url`.
    ///
    /// # Errors
    /// Extraction errors as for [`Self::extract`]; storage errors from the upload.
    pub async fn process_document(&self, source: &Path, images: &[PathBuf]) -> Result<IdDocument> {
        let mut document = self.extract(images, &self.prompt_template).await?;
        document.file_url = Some(self.blobs.upload(source).await?);
        Ok(document)
    }
}
