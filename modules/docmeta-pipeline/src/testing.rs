// Test doubles for the archive pipeline.
//
// - MockCaptioner (CaptionBackend): text -> caption table, failure and panic injection
// - ZipFixture: in-memory zip builder
// - test_extractor / test_processor: wire mocks into the real pipeline types
//
// OCR-side doubles (MockOcr, StubRenderer) and document fixtures are
// re-exported from docmeta-ocr.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docmeta_common::PipelineConfig;
use docmeta_ocr::{ExtractorOptions, OcrBackend, TextExtractor};
use docmeta_storage::Storage;

pub use docmeta_ocr::testing::{jpeg_stub, pdf_with_pages, MockOcr, StubRenderer};

use crate::archive::ArchiveProcessor;
use crate::caption::{CaptionBackend, CaptionGenerator};
use crate::worker::FileWorker;

// ---------------------------------------------------------------------------
// MockCaptioner
// ---------------------------------------------------------------------------

enum Reply {
    Caption(String),
    Fail(String),
    Panic(String),
}

/// Caption backend answering from a table keyed by input text.
pub struct MockCaptioner {
    replies: HashMap<String, Reply>,
    default: Reply,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl Default for MockCaptioner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCaptioner {
    /// Echoes no caption unless configured.
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            default: Reply::Caption(String::new()),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn on_text(mut self, text: &str, caption: &str) -> Self {
        self.replies
            .insert(text.to_string(), Reply::Caption(caption.to_string()));
        self
    }

    pub fn default_caption(mut self, caption: &str) -> Self {
        self.default = Reply::Caption(caption.to_string());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.default = Reply::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.default = Reply::Panic(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CaptionBackend for MockCaptioner {
    async fn generate_caption(&self, text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());

        match self.replies.get(text).unwrap_or(&self.default) {
            Reply::Caption(c) => Ok(c.clone()),
            Reply::Fail(m) => Err(anyhow!("{m}")),
            Reply::Panic(m) => panic!("{m}"),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// ZipFixture
// ---------------------------------------------------------------------------

/// Builds zip archives in memory.
#[derive(Default)]
pub struct ZipFixture {
    items: Vec<(String, Option<Vec<u8>>)>,
}

impl ZipFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, bytes: impl AsRef<[u8]>) -> Self {
        self.items.push((name.to_string(), Some(bytes.as_ref().to_vec())));
        self
    }

    pub fn dir(mut self, name: &str) -> Self {
        self.items.push((name.to_string(), None));
        self
    }

    /// Entries are stored uncompressed so tests can locate and damage payloads.
    pub fn build(self) -> Bytes {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, body) in self.items {
            match body {
                Some(body) => {
                    zip.start_file(name, options).expect("start zip entry");
                    zip.write_all(&body).expect("write zip entry");
                }
                None => zip.add_directory(name, options).expect("add zip directory"),
            }
        }
        Bytes::from(zip.finish().expect("finish zip").into_inner())
    }
}

/// Flip one byte of the first occurrence of `payload` so that entry fails
/// its checksum on read.
pub fn corrupt_payload(archive: &Bytes, payload: &[u8]) -> Bytes {
    let mut bytes = archive.to_vec();
    let at = bytes
        .windows(payload.len())
        .position(|w| w == payload)
        .expect("payload present in archive");
    bytes[at] ^= 0xFF;
    Bytes::from(bytes)
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Real extractor over a mock OCR backend and the stub page renderer.
pub fn test_extractor(ocr: Arc<dyn OcrBackend>, scratch: &Path) -> TextExtractor {
    TextExtractor::new(
        ocr,
        Arc::new(StubRenderer::new()),
        ExtractorOptions {
            scratch_dir: scratch.to_path_buf(),
            ..Default::default()
        },
    )
}

pub fn test_processor(
    storage: Arc<dyn Storage>,
    ocr: Arc<dyn OcrBackend>,
    captioner: Arc<dyn CaptionBackend>,
    config: &PipelineConfig,
    scratch: &Path,
) -> ArchiveProcessor {
    let worker = FileWorker::new(
        Arc::new(test_extractor(ocr, scratch)),
        Arc::new(CaptionGenerator::from_config(captioner, config)),
    );
    ArchiveProcessor::new(storage, Arc::new(worker), config)
}
