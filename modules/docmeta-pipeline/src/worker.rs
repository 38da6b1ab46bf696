use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use tracing::{debug, error, warn};

use docmeta_common::FileRecord;
use docmeta_ocr::{ExtractError, Extraction, TextExtractor};

use crate::caption::CaptionGenerator;

/// One file inside an archive.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path relative to the archive root.
    pub name: String,
    pub bytes: Bytes,
}

impl Entry {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Extract, then caption, one entry. Every outcome, including a panic in
/// either stage, is folded into a [`FileRecord`].
pub struct FileWorker {
    extractor: Arc<TextExtractor>,
    captioner: Arc<CaptionGenerator>,
}

impl FileWorker {
    pub fn new(extractor: Arc<TextExtractor>, captioner: Arc<CaptionGenerator>) -> Self {
        Self {
            extractor,
            captioner,
        }
    }

    pub async fn process(&self, entry: Entry) -> FileRecord {
        let Entry { name, bytes } = entry;

        match AssertUnwindSafe(self.describe(&name, bytes)).catch_unwind().await {
            Ok(Ok(caption)) => FileRecord::new(name, caption),
            Ok(Err(e)) => {
                warn!(entry = %name, error = %e, "Text extraction failed");
                FileRecord::failed(name, e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(entry = %name, panic = %message, "Entry processing panicked");
                FileRecord::failed(name, message)
            }
        }
    }

    async fn describe(&self, name: &str, bytes: Bytes) -> Result<String, ExtractError> {
        let caption = match self.extractor.extract(bytes, name).await? {
            Extraction::Empty => {
                debug!(entry = name, "No text, captioning with file name");
                name.to_string()
            }
            Extraction::Unsupported(sentinel) => sentinel.to_string(),
            Extraction::Text(text) => {
                let caption = self.captioner.caption(&text).await;
                if caption.is_empty() {
                    name.to_string()
                } else {
                    caption
                }
            }
        };
        Ok(caption)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
