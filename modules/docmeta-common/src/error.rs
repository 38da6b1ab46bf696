use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocMetaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
