pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CaptionBackendKind, CaptionConfig, Config, OcrBackendKind, OcrConfig, PipelineConfig,
    ServiceConfig, StorageConfig, CAPTION_PLACEHOLDER, DEFAULT_CAPTION_PROMPT,
};
pub use error::DocMetaError;
pub use types::{
    error_caption, is_error_caption, metadata_key_for, ArchiveHandle, ArchiveMetadata, FileRecord,
    ERROR_MARKER,
};
