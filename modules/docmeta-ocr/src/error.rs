/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("Page rendering failed: {0}")]
    Render(String),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Scratch I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(e: tokio::task::JoinError) -> Self {
        ExtractError::Task(e.to_string())
    }
}

impl From<image::ImageError> for ExtractError {
    fn from(e: image::ImageError) -> Self {
        ExtractError::Image(e.to_string())
    }
}
