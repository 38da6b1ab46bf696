use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Turns one raster image into text.
///
/// Implementations may run locally or call a hosted service; callers treat
/// every call as a suspension point that can fail.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// `languages` are Tesseract-style codes (`eng`, `heb`). Backends that
    /// detect language themselves may ignore them.
    async fn recognize(&self, image: Bytes, languages: &[String]) -> Result<String>;

    fn name(&self) -> &str;
}
