use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::backend::OcrBackend;
use crate::clean::clean_text;
use crate::error::Result;
use crate::kind::{classify, DocumentKind};
use crate::pdf;
use crate::render::{binarize, PageRenderer};

/// Caption used for blobs that are neither a raster image nor a readable PDF.
pub const UNSUPPORTED_DOCUMENT: &str = "Unsupported or corrupt document.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Cleaned, non-empty text.
    Text(String),
    /// The document was readable but yielded no meaningful text.
    Empty,
    /// The blob could not be interpreted. Carries a caption-ready sentinel.
    Unsupported(&'static str),
}

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub languages: Vec<String>,
    pub max_pages: u32,
    pub render_dpi: u32,
    pub binarize_threshold: u8,
    /// Parent of the per-call scratch directories.
    pub scratch_dir: PathBuf,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            languages: vec!["eng".into(), "heb".into()],
            max_pages: 5,
            render_dpi: 300,
            binarize_threshold: 65,
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Classifies a blob and turns it into cleaned text.
///
/// Images go straight to the OCR backend. PDFs are rendered page by page up
/// to `max_pages`, binarized, OCR'd, and the native text layer of the same
/// pages is appended after the OCR output. Intermediate files live in a
/// scratch directory that is removed on every exit path.
pub struct TextExtractor {
    ocr: Arc<dyn OcrBackend>,
    renderer: Arc<dyn PageRenderer>,
    options: ExtractorOptions,
}

impl TextExtractor {
    pub fn new(
        ocr: Arc<dyn OcrBackend>,
        renderer: Arc<dyn PageRenderer>,
        options: ExtractorOptions,
    ) -> Self {
        Self {
            ocr,
            renderer,
            options,
        }
    }

    pub async fn extract(&self, bytes: Bytes, name: &str) -> Result<Extraction> {
        if bytes.is_empty() {
            return Ok(Extraction::Empty);
        }

        let kind = classify(&bytes, name);
        debug!(name, %kind, bytes = bytes.len(), ocr = self.ocr.name(), "Extracting text");

        let raw = match kind {
            DocumentKind::Unsupported => {
                return Ok(Extraction::Unsupported(UNSUPPORTED_DOCUMENT));
            }
            DocumentKind::Image => self.ocr.recognize(bytes, &self.options.languages).await?,
            DocumentKind::PaginatedDocument => match self.extract_paginated(bytes, name).await? {
                Some(text) => text,
                None => return Ok(Extraction::Unsupported(UNSUPPORTED_DOCUMENT)),
            },
        };

        let cleaned = clean_text(&raw);
        if cleaned.is_empty() {
            Ok(Extraction::Empty)
        } else {
            Ok(Extraction::Text(cleaned))
        }
    }

    /// `None` when the PDF cannot be parsed.
    async fn extract_paginated(&self, bytes: Bytes, name: &str) -> Result<Option<String>> {
        let max_pages = self.options.max_pages;
        let parse_input = bytes.clone();
        let native = match tokio::task::spawn_blocking(move || {
            pdf::read_pages(&parse_input, max_pages)
        })
        .await?
        {
            Ok(native) => native,
            Err(e) => {
                warn!(name, error = %e, "Unreadable PDF");
                return Ok(None);
            }
        };

        // Dropping the TempDir removes it, whichever way this function exits.
        let scratch = tempfile::Builder::new()
            .prefix("docmeta-")
            .tempdir_in(&self.options.scratch_dir)?;
        let pdf_path = scratch.path().join("document.pdf");
        tokio::fs::write(&pdf_path, &bytes).await?;
        drop(bytes);

        let mut parts = Vec::with_capacity(native.pages.len() * 2);
        for page in 1..=native.processed_pages() {
            let rendered = self
                .renderer
                .render(&pdf_path, page, self.options.render_dpi, scratch.path())
                .await?;

            let bw_path = scratch.path().join(format!("page-{page}-bw.png"));
            let threshold = self.options.binarize_threshold;
            let bw_out = bw_path.clone();
            tokio::task::spawn_blocking(move || binarize(&rendered, &bw_out, threshold)).await??;

            let image = tokio::fs::read(&bw_path).await?;
            let text = self
                .ocr
                .recognize(Bytes::from(image), &self.options.languages)
                .await?;
            debug!(name, page, chars = text.len(), "Page OCR complete");
            parts.push(text);
        }
        let processed = native.processed_pages();
        parts.extend(native.pages);

        debug!(name, pages = native.page_count, processed, "PDF extraction complete");
        Ok(Some(parts.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg_stub, pdf_with_pages, MockOcr, StubRenderer};

    fn extractor(ocr: Arc<MockOcr>, scratch: &std::path::Path, max_pages: u32) -> TextExtractor {
        extractor_with(ocr, Arc::new(StubRenderer::new()), scratch, max_pages)
    }

    fn extractor_with(
        ocr: Arc<MockOcr>,
        renderer: Arc<StubRenderer>,
        scratch: &std::path::Path,
        max_pages: u32,
    ) -> TextExtractor {
        TextExtractor::new(
            ocr,
            renderer,
            ExtractorOptions {
                max_pages,
                scratch_dir: scratch.to_path_buf(),
                ..Default::default()
            },
        )
    }

    fn scratch_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn image_text_is_cleaned() {
        let scratch = tempfile::tempdir().unwrap();
        let ocr = Arc::new(MockOcr::new().on_image(jpeg_stub("scan1"), "  Invoice\n#123  "));
        let ex = extractor(ocr.clone(), scratch.path(), 5);

        let out = ex.extract(jpeg_stub("scan1"), "scan1.jpg").await.unwrap();
        assert_eq!(out, Extraction::Text("Invoice #123".into()));
        assert_eq!(ocr.calls(), 1);
        assert_eq!(ocr.seen_languages(), vec![vec!["eng".to_string(), "heb".to_string()]]);
    }

    #[tokio::test]
    async fn blank_ocr_is_empty() {
        let scratch = tempfile::tempdir().unwrap();
        let ex = extractor(Arc::new(MockOcr::new()), scratch.path(), 5);
        let out = ex.extract(jpeg_stub("x"), "x.jpg").await.unwrap();
        assert_eq!(out, Extraction::Empty);
    }

    #[tokio::test]
    async fn unsupported_blob_skips_ocr() {
        let scratch = tempfile::tempdir().unwrap();
        let ocr = Arc::new(MockOcr::new());
        let renderer = Arc::new(StubRenderer::new());
        let ex = extractor_with(ocr.clone(), renderer.clone(), scratch.path(), 5);

        let out = ex
            .extract(Bytes::from_static(b"just some text"), "notes.txt")
            .await
            .unwrap();
        assert_eq!(out, Extraction::Unsupported(UNSUPPORTED_DOCUMENT));
        assert_eq!(ocr.calls(), 0);
        assert_eq!(renderer.rendered(), 0);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_unsupported() {
        let scratch = tempfile::tempdir().unwrap();
        let ex = extractor(Arc::new(MockOcr::new()), scratch.path(), 5);
        let out = ex
            .extract(Bytes::from_static(b"%PDF-1.4 truncated"), "bad.pdf")
            .await
            .unwrap();
        assert_eq!(out, Extraction::Unsupported(UNSUPPORTED_DOCUMENT));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn pdf_ocr_text_precedes_native_text_and_respects_page_cap() {
        let scratch = tempfile::tempdir().unwrap();
        let ocr = Arc::new(MockOcr::new().default_text("scanned"));
        let renderer = Arc::new(StubRenderer::new());
        let ex = extractor_with(ocr.clone(), renderer.clone(), scratch.path(), 2);

        let pdf = pdf_with_pages(&["Alpha", "Beta", "Gamma"]);
        let out = ex.extract(Bytes::from(pdf), "doc.pdf").await.unwrap();

        let text = match out {
            Extraction::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        };
        assert!(text.starts_with("scanned scanned"), "{text}");
        let alpha = text.find("Alpha").unwrap();
        let beta = text.find("Beta").unwrap();
        assert!(alpha < beta);
        assert!(!text.contains("Gamma"));
        assert_eq!(renderer.rendered(), 2);
        assert_eq!(ocr.calls(), 2);
        assert_eq!(ocr.seen_languages().len(), 2);
        assert!(ocr.seen_languages().iter().all(|langs| langs == &["eng", "heb"]));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn scratch_is_removed_when_ocr_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let ocr = Arc::new(MockOcr::new().failing("engine crashed"));
        let ex = extractor(ocr, scratch.path(), 5);

        let pdf = pdf_with_pages(&["Alpha"]);
        let err = ex.extract(Bytes::from(pdf), "doc.pdf").await.unwrap_err();

        assert!(err.to_string().contains("engine crashed"));
        assert!(scratch_is_empty(scratch.path()));
    }
}
