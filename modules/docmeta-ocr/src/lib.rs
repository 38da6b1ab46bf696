//! Text extraction for scanned documents.
//!
//! [`TextExtractor`] classifies a blob into a [`DocumentKind`], routes it to
//! the image or paginated strategy, runs OCR through an [`OcrBackend`] and
//! normalizes the result with [`clean_text`].

pub mod backend;
pub mod clean;
pub mod document_intelligence;
pub mod error;
pub mod extractor;
pub mod kind;
pub mod pdf;
pub mod render;
pub mod tesseract;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backend::OcrBackend;
pub use clean::clean_text;
pub use document_intelligence::DocumentIntelligence;
pub use error::{ExtractError, Result};
pub use extractor::{Extraction, ExtractorOptions, TextExtractor, UNSUPPORTED_DOCUMENT};
pub use kind::{classify, DocumentKind};
pub use render::{binarize, PageRenderer, Pdftoppm};
pub use tesseract::TesseractCli;
