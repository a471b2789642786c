//! Rasterizes PDF pages to image files and optionally runs OCR (§4.3).

mod ocr;
mod page_count;
mod raster;

pub use ocr::OcrRunner;
pub use page_count::estimate_page_count;
pub use raster::RasterOutput;

use std::path::Path;

use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::{ImageExtractionOptions, ImageFormat};
use crate::error::CoreResult;

const MAX_CONSECUTIVE_FAILURES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub page_number: u32,
    pub image_number: u32,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub byte_size: usize,
    pub dpi: u32,
    pub extraction_method: String,
    pub storage_id: String,
    pub ocr_text: Option<String>,
}

/// External collaborator that persists rasterized bytes and returns a
/// storage id — the engine-internal narrowing of §6's ObjectStorage that
/// image extraction actually calls.
#[async_trait::async_trait]
pub trait ImageSink: Send + Sync {
    async fn store(&self, page_number: u32, image_number: u32, bytes: &[u8]) -> CoreResult<String>;
}

/// Sink used by tests and by callers that only care about dimensions, not
/// persistence.
pub struct NullImageSink;

#[async_trait::async_trait]
impl ImageSink for NullImageSink {
    async fn store(&self, page_number: u32, image_number: u32, _bytes: &[u8]) -> CoreResult<String> {
        Ok(format!("null://{page_number}-{image_number}"))
    }
}

pub struct ImageExtractor {
    ocr: OcrRunner,
}

impl ImageExtractor {
    pub fn new(ocr_language: String) -> Self {
        Self {
            ocr: OcrRunner::new(ocr_language),
        }
    }

    /// Rasterizes the requested pages of `document`, persisting each image
    /// through `sink` and optionally running OCR. Per-page failures are
    /// retried once with reduced parameters; five consecutive failures
    /// abort extraction but the function still returns successfully with
    /// whatever was extracted so far (§4.3).
    pub async fn extract<S>(
        &mut self,
        document: &PdfDocument<'_>,
        options: &ImageExtractionOptions,
        sink: &S,
        ocr_enabled: bool,
    ) -> CoreResult<Vec<ExtractedImage>>
    where
        S: ImageSink,
    {
        let total_pages = document.pages().len() as u32;
        let pages: Vec<u32> = options
            .pages
            .clone()
            .unwrap_or_else(|| (0..total_pages).collect());

        let mut results = Vec::new();
        let mut consecutive_failures: u32 = 0;

        for page_index in pages {
            let page = match document.pages().get(page_index as u16) {
                Ok(p) => p,
                Err(_) => {
                    consecutive_failures += 1;
                    if self.should_abort(consecutive_failures) {
                        break;
                    }
                    continue;
                }
            };

            let page_number = page_index + 1;
            match self.extract_one_page(&page, page_number, options, sink, ocr_enabled).await {
                Ok(extracted) => {
                    consecutive_failures = 0;
                    results.push(extracted);
                }
                Err(e) => {
                    tracing::warn!(page = page_number, error = %e, "page rasterization failed");
                    consecutive_failures += 1;
                    if self.should_abort(consecutive_failures) {
                        break;
                    }
                }
            }
        }

        Ok(results)
    }

    fn should_abort(&self, consecutive_failures: u32) -> bool {
        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            tracing::warn!(
                consecutive_failures,
                "aborting image extraction after consecutive failures; \
                 continuing pipeline with images extracted so far"
            );
            true
        } else {
            false
        }
    }

    async fn extract_one_page<S>(
        &mut self,
        page: &PdfPage<'_>,
        page_number: u32,
        options: &ImageExtractionOptions,
        sink: &S,
        ocr_enabled: bool,
    ) -> CoreResult<ExtractedImage>
    where
        S: ImageSink,
    {
        let raster = match raster::rasterize(page, options) {
            Ok(out) => out,
            Err(_) => {
                let reduced = raster::reduced_options(options);
                raster::rasterize(page, &reduced)?
            }
        };

        let ocr_text = if ocr_enabled {
            self.ocr.run_on_bytes(&raster.bytes).await
        } else {
            None
        };

        let storage_id = sink.store(page_number, 1, &raster.bytes).await?;

        Ok(ExtractedImage {
            page_number,
            image_number: 1,
            format: options.format,
            width: raster.width,
            height: raster.height,
            byte_size: raster.bytes.len(),
            dpi: options.dpi,
            extraction_method: "pdfium-raster".to_string(),
            storage_id,
            ocr_text,
        })
    }
}

pub fn page_count_from_file_size(path: &Path) -> CoreResult<u32> {
    let bytes = std::fs::metadata(path)?.len();
    Ok(estimate_page_count(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn does_not_abort_before_five_consecutive_failures() {
        let extractor = ImageExtractor::new("eng".to_string());
        for n in 1..MAX_CONSECUTIVE_FAILURES {
            assert!(!extractor.should_abort(n), "should not abort at {n} consecutive failures");
        }
    }

    #[test]
    fn aborts_at_five_consecutive_failures() {
        let extractor = ImageExtractor::new("eng".to_string());
        assert!(extractor.should_abort(MAX_CONSECUTIVE_FAILURES));
        assert!(extractor.should_abort(MAX_CONSECUTIVE_FAILURES + 1));
    }
}
