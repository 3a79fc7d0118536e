//! Document photo comparison on top of a [`FaceService`].

use idverify_storage::BlobStore;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{select_highest_quality, DetectOptions, FaceRecord, FaceRectangle, FaceService};
use crate::error::{Result, VerifyError};
use crate::models::{DocumentVisualAnalysis, FaceVerifyResult};

/// Default pixels added around a detected face box
pub const DEFAULT_BUFFER: u32 = 10;

const LINE_THICKNESS: u32 = 3;
const MATCH_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const MISMATCH_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Faces found in one image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub face_ids: Vec<String>,
    pub faces: Vec<FaceRecord>,
    /// One uploaded annotated copy of the image per detected face
    pub annotated_images: Vec<String>,
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| VerifyError::FaceService(format!("failed to decode image: {e}")))
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| VerifyError::FaceService(format!("failed to read image {}: {e}", path.display())))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| VerifyError::FaceService(format!("failed to encode image: {e}")))?;
    Ok(png)
}

/// Draw a rectangle around the face, outset by `buffer` and clamped to the image.
pub fn annotate(image: &DynamicImage, face: &FaceRectangle, buffer: u32, color: Rgba<u8>) -> RgbaImage {
    let mut img = image.to_rgba8();
    let Some((x, y, w, h)) = face.outset_clamped(buffer, img.width(), img.height()) else {
        return img;
    };

    for t in 0..LINE_THICKNESS {
        let inner_w = w.saturating_sub(2 * t);
        let inner_h = h.saturating_sub(2 * t);
        if inner_w > 0 && inner_h > 0 {
            let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(&mut img, rect, color);
        }
    }
    img
}

/// Cut the face out of the image, outset by `buffer` and clamped to the image.
pub fn crop(image: &DynamicImage, face: &FaceRectangle, buffer: u32) -> Option<DynamicImage> {
    let (x, y, w, h) = face.outset_clamped(buffer, image.width(), image.height())?;
    Some(image.crop_imm(x, y, w, h))
}

/// Compares document photos and analyzes faces printed on documents
#[derive(Clone)]
pub struct FaceMatcher {
    service: Arc<dyn FaceService>,
    blobs: Arc<dyn BlobStore>,
    options: DetectOptions,
    buffer: u32,
    work_dir: PathBuf,
}

impl std::fmt::Debug for FaceMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceMatcher")
            .field("options", &self.options)
            .field("buffer", &self.buffer)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl FaceMatcher {
    pub fn new(
        service: Arc<dyn FaceService>,
        blobs: Arc<dyn BlobStore>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service,
            blobs,
            options: DetectOptions::default(),
            buffer: DEFAULT_BUFFER,
            work_dir: work_dir.into(),
        }
    }

    #[must_use]
    pub fn with_buffer(mut self, buffer: u32) -> Self {
        self.buffer = buffer;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: DetectOptions) -> Self {
        self.options = options;
        self
    }

    async fn detect_bytes(&self, bytes: &[u8]) -> Result<Vec<FaceRecord>> {
        Ok(self.service.detect(bytes, &self.options).await?)
    }

    async fn upload_png(&self, name: &str, image: &DynamicImage) -> Result<String> {
        let png = encode_png(image)?;
        Ok(self.blobs.upload_bytes(name, &png).await?)
    }

    /// Read a local path, or download a remote blob into its own slot
    /// directory under `scratch` (sources may share a file name)
    async fn load(&self, source: &str, scratch: &Path, slot: usize) -> Result<Vec<u8>> {
        let path = if is_remote(source) {
            let dest = scratch.join(format!("source-{slot}"));
            tokio::fs::create_dir_all(&dest).await.map_err(|e| {
                VerifyError::FaceService(format!("failed to create {}: {e}", dest.display()))
            })?;
            debug!("Downloading {}", source);
            self.blobs.download(source, &dest).await?
        } else {
            PathBuf::from(source)
        };
        read_image(&path).await
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        std::fs::create_dir_all(&self.work_dir)
            .and_then(|()| {
                tempfile::Builder::new()
                    .prefix("faces-")
                    .tempdir_in(&self.work_dir)
            })
            .map_err(|e| {
                VerifyError::FaceService(format!(
                    "failed to create scratch directory in {}: {e}",
                    self.work_dir.display()
                ))
            })
    }

    /// Detect every face in an image and upload one annotated copy per face
    ///
    /// # Errors
    /// Propagates face service, storage and image decoding failures.
    pub async fn detect_faces(&self, path: &Path) -> Result<FaceDetection> {
        let bytes = read_image(path).await?;
        let faces = self.detect_bytes(&bytes).await?;
        let face_ids = faces.iter().filter_map(|f| f.face_id.clone()).collect();

        let mut annotated_images = Vec::with_capacity(faces.len());
        if !faces.is_empty() {
            let image = decode(&bytes)?;
            for face in &faces {
                let annotated = annotate(&image, &face.face_rectangle, self.buffer, MISMATCH_COLOR);
                let url = self
                    .upload_png("face_rectangle.png", &DynamicImage::ImageRgba8(annotated))
                    .await?;
                annotated_images.push(url);
            }
        }

        info!("Detected {} face(s) in {}", faces.len(), path.display());
        Ok(FaceDetection {
            face_ids,
            faces,
            annotated_images,
        })
    }

    /// Compare the best face of each image.
    ///
    /// Either side may be a local path or an `http(s)://` blob URL. When
    /// either image has no detectable face the result is the degenerate
    /// [`FaceVerifyResult::no_faces`], not an error.
    ///
    /// # Errors
    /// Propagates face service, storage and image decoding failures.
    pub async fn compare_document_photos(&self, source_1: &str, source_2: &str) -> Result<FaceVerifyResult> {
        let scratch = self.scratch_dir()?;
        let (bytes_1, bytes_2) = tokio::try_join!(
            self.load(source_1, scratch.path(), 1),
            self.load(source_2, scratch.path(), 2)
        )?;

        let (faces_1, faces_2) =
            tokio::try_join!(self.detect_bytes(&bytes_1), self.detect_bytes(&bytes_2))?;

        let (Some(i1), Some(i2)) = (
            select_highest_quality(&faces_1),
            select_highest_quality(&faces_2),
        ) else {
            info!(
                "No face to compare ({} vs {} detected)",
                faces_1.len(),
                faces_2.len()
            );
            return Ok(FaceVerifyResult::no_faces());
        };
        let (face_1, face_2) = (&faces_1[i1], &faces_2[i2]);

        let face_id = |face: &FaceRecord| {
            face.face_id.clone().ok_or_else(|| {
                VerifyError::FaceService("detector returned a face without faceId".to_string())
            })
        };
        let verification = self
            .service
            .verify(&face_id(face_1)?, &face_id(face_2)?)
            .await?;

        let color = if verification.is_identical {
            MATCH_COLOR
        } else {
            MISMATCH_COLOR
        };
        let annotated_1 = annotate(&decode(&bytes_1)?, &face_1.face_rectangle, self.buffer, color);
        let annotated_2 = annotate(&decode(&bytes_2)?, &face_2.face_rectangle, self.buffer, color);

        let photo_1 = self
            .upload_png("face_rectangle.png", &DynamicImage::ImageRgba8(annotated_1))
            .await?;
        let photo_2 = self
            .upload_png("face_rectangle.png", &DynamicImage::ImageRgba8(annotated_2))
            .await?;

        info!(
            "Face verification: identical={} confidence={}",
            verification.is_identical, verification.confidence
        );
        Ok(FaceVerifyResult {
            is_identical: verification.is_identical,
            confidence: verification.confidence,
            photo_1: Some(photo_1),
            photo_2: Some(photo_2),
            error: None,
        })
    }

    /// Crop the best face of an image and upload it. `None` when no face is found.
    ///
    /// # Errors
    /// Propagates face service, storage and image decoding failures.
    pub async fn crop_best_face(&self, path: &Path) -> Result<Option<String>> {
        let bytes = read_image(path).await?;
        let faces = self.detect_bytes(&bytes).await?;
        let Some(best) = select_highest_quality(&faces) else {
            return Ok(None);
        };

        let image = decode(&bytes)?;
        let Some(cropped) = crop(&image, &faces[best].face_rectangle, self.buffer) else {
            return Ok(None);
        };
        Ok(Some(self.upload_png("face.png", &cropped).await?))
    }

    /// Faces printed on the document: detection results of the first page
    /// showing a face, plus the uploaded crop of its best face.
    ///
    /// # Errors
    /// Propagates face service, storage and image decoding failures.
    pub async fn analyze_document(&self, pages: &[PathBuf]) -> Result<DocumentVisualAnalysis> {
        for page in pages {
            let detection = self.detect_faces(page).await?;
            let Some(best) = select_highest_quality(&detection.faces) else {
                continue;
            };

            let image = decode(&read_image(page).await?)?;
            let cropped_face = match crop(&image, &detection.faces[best].face_rectangle, self.buffer) {
                Some(cropped) => Some(self.upload_png("face.png", &cropped).await?),
                None => None,
            };

            return Ok(DocumentVisualAnalysis {
                face_ids: detection.face_ids,
                faces: detection.faces,
                annotated_images: detection.annotated_images,
                cropped_face,
            });
        }
        Ok(DocumentVisualAnalysis::default())
    }
}
