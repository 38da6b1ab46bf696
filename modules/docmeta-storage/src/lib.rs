//! Object storage seam for the archive pipeline.
//!
//! Keys are `/`-separated relative paths. The pipeline only needs four
//! operations, so any bucket-like backend can sit behind [`Storage`].

pub mod error;
pub mod fs;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{Result, StorageError};
pub use fs::FsStore;
pub use memory::MemoryStore;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[async_trait]
pub trait Storage: Send + Sync {
    /// All keys under `prefix` (every key when `None`), sorted.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Create or overwrite `key`.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    async fn head_exists(&self, key: &str) -> Result<bool>;

    fn name(&self) -> &str;
}
