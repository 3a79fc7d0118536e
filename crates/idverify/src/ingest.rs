//! Document ingestion: turn an uploaded file into an ordered list of page images.
//!
//! Images (`.jpg`, `.jpeg`, `.png`) pass through untouched. PDFs are
//! rasterized page by page into a temporary directory owned by the returned
//! [`IngestedDocument`], so the pages disappear when it is dropped.

// DPI and dimension calculations mix integer and float types
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use crate::error::{Result, VerifyError};
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// PDF points per inch
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Resolution PDFs are rasterized at unless configured otherwise
pub const DEFAULT_DPI: u32 = 300;

/// Kind of input a path names, by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Image,
}

impl DocumentFormat {
    /// Classify a path by its (case-insensitive) extension
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` for anything but PDF, JPEG or PNG.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("jpg" | "jpeg" | "png") => Ok(Self::Image),
            _ => Err(VerifyError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Renders every page of a PDF to PNG bytes, in page order
pub trait PageRasterizer: Send + Sync {
    /// # Errors
    /// Returns an error if the PDF cannot be loaded or a page fails to render.
    fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<Vec<u8>>>;
}

/// Rasterizer backed by the pdfium library
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    fn bind() -> Result<Pdfium> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| VerifyError::Ingestion(format!("pdfium library not available: {e}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path, dpi: u32) -> Result<Vec<Vec<u8>>> {
        let pdfium = Self::bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| VerifyError::Ingestion(format!("failed to load PDF: {e}")))?;

        let mut pages = Vec::with_capacity(document.pages().len() as usize);
        for (i, page) in document.pages().iter().enumerate() {
            let page_num = i + 1;
            let width = page.width().value;
            let height = page.height().value;

            let render_config = PdfRenderConfig::new()
                .set_target_width((width * dpi as f32 / PDF_POINTS_PER_INCH) as i32)
                .set_target_height((height * dpi as f32 / PDF_POINTS_PER_INCH) as i32);

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                VerifyError::Ingestion(format!("failed to render page {page_num}: {e}"))
            })?;

            let mut png = Vec::new();
            bitmap
                .as_image()
                .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
                .map_err(|e| VerifyError::Ingestion(format!("failed to encode page {page_num}: {e}")))?;
            pages.push(png);
        }

        Ok(pages)
    }
}

/// A document normalized to page images
#[derive(Debug)]
pub struct IngestedDocument {
    source: PathBuf,
    pages: Vec<PathBuf>,
    // Rasterized pages live here; dropped with the document.
    _scratch: Option<TempDir>,
}

impl IngestedDocument {
    /// The file that was ingested
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Page images in page order
    #[must_use]
    pub fn pages(&self) -> &[PathBuf] {
        &self.pages
    }

    /// The first page, used as the document photo source
    #[must_use]
    pub fn first_page(&self) -> Option<&Path> {
        self.pages.first().map(PathBuf::as_path)
    }
}

/// Normalizes uploaded documents into page images
#[derive(Clone)]
pub struct DocumentIngestor {
    rasterizer: Arc<dyn PageRasterizer>,
    work_root: PathBuf,
    dpi: u32,
}

impl std::fmt::Debug for DocumentIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIngestor")
            .field("work_root", &self.work_root)
            .field("dpi", &self.dpi)
            .finish_non_exhaustive()
    }
}

impl DocumentIngestor {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, work_root: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            rasterizer,
            work_root: work_root.into(),
            dpi,
        }
    }

    /// Ingestor using pdfium at the given resolution
    pub fn with_pdfium(work_root: impl Into<PathBuf>, dpi: u32) -> Self {
        Self::new(Arc::new(PdfiumRasterizer), work_root, dpi)
    }

    /// Normalize a document into its ordered page images
    ///
    /// # Errors
    /// `UnsupportedFormat` for unknown extensions, `Ingestion` if the file is
    /// missing or a PDF cannot be rasterized.
    pub fn normalize(&self, path: &Path) -> Result<IngestedDocument> {
        let format = DocumentFormat::from_path(path)?;
        if !path.is_file() {
            return Err(VerifyError::Ingestion(format!(
                "document not found: {}",
                path.display()
            )));
        }

        match format {
            DocumentFormat::Image => {
                debug!("Ingested image {}", path.display());
                Ok(IngestedDocument {
                    source: path.to_path_buf(),
                    pages: vec![path.to_path_buf()],
                    _scratch: None,
                })
            }
            DocumentFormat::Pdf => {
                std::fs::create_dir_all(&self.work_root)?;
                let scratch = tempfile::Builder::new()
                    .prefix("pages-")
                    .tempdir_in(&self.work_root)?;

                let rendered = self.rasterizer.rasterize(path, self.dpi)?;
                if rendered.is_empty() {
                    return Err(VerifyError::Ingestion(format!(
                        "PDF has no pages: {}",
                        path.display()
                    )));
                }

                let mut pages = Vec::with_capacity(rendered.len());
                for (i, png) in rendered.iter().enumerate() {
                    let page_path = scratch.path().join(format!("page-{:03}.png", i + 1));
                    std::fs::write(&page_path, png)?;
                    pages.push(page_path);
                }

                info!(
                    "Rasterized {} page(s) of {} at {} DPI",
                    pages.len(),
                    path.display(),
                    self.dpi
                );
                Ok(IngestedDocument {
                    source: path.to_path_buf(),
                    pages,
                    _scratch: Some(scratch),
                })
            }
        }
    }
}
