//! Test doubles and fixtures for the extraction pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{GrayImage, Luma};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use crate::backend::OcrBackend;
use crate::error::{ExtractError, Result};
use crate::render::PageRenderer;

// =============================================================================
// MockOcr
// =============================================================================

/// OCR backend answering from a table keyed by image bytes.
///
/// Tracks call count and the peak number of concurrent calls, so tests can
/// assert on parallelism bounds.
pub struct MockOcr {
    responses: HashMap<Vec<u8>, std::result::Result<String, String>>,
    default: std::result::Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen_languages: Mutex<Vec<Vec<String>>>,
}

impl Default for MockOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOcr {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default: Ok(String::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            seen_languages: Mutex::new(Vec::new()),
        }
    }

    pub fn on_image(mut self, image: impl AsRef<[u8]>, text: &str) -> Self {
        self.responses.insert(image.as_ref().to_vec(), Ok(text.to_string()));
        self
    }

    pub fn failing_on(mut self, image: impl AsRef<[u8]>, message: &str) -> Self {
        self.responses
            .insert(image.as_ref().to_vec(), Err(message.to_string()));
        self
    }

    /// Answer for images with no explicit entry.
    pub fn default_text(mut self, text: &str) -> Self {
        self.default = Ok(text.to_string());
        self
    }

    /// Fail every image with no explicit entry.
    pub fn failing(mut self, message: &str) -> Self {
        self.default = Err(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen_languages(&self) -> Vec<Vec<String>> {
        self.seen_languages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl OcrBackend for MockOcr {
    async fn recognize(&self, image: Bytes, languages: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.seen_languages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(languages.to_vec());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.responses
            .get(image.as_ref())
            .unwrap_or(&self.default)
            .clone()
            .map_err(ExtractError::Ocr)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// StubRenderer
// =============================================================================

/// Writes a small gradient PNG per page instead of rasterizing the PDF.
#[derive(Default)]
pub struct StubRenderer {
    rendered: AtomicUsize,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageRenderer for StubRenderer {
    async fn render(&self, _pdf: &Path, page: u32, _dpi: u32, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join(format!("page-{page}.png"));
        GrayImage::from_fn(16, 16, |x, y| Luma([((x + y) * 8) as u8])).save(&path)?;
        self.rendered.fetch_add(1, Ordering::SeqCst);
        Ok(path)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Bytes that sniff as JPEG. `tag` keeps fixtures distinguishable.
pub fn jpeg_stub(tag: &str) -> Bytes {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    bytes.extend_from_slice(tag.as_bytes());
    Bytes::from(bytes)
}

/// A minimal PDF with one page per entry, each drawing its text in Courier.
/// An empty string yields a page with no text layer.
pub fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations }
            .encode()
            .expect("encode page content");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialize pdf");
    out
}
