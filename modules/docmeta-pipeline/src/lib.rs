//! Zip-archive fan-out: OCR every entry, caption it, and write one JSON
//! sidecar per archive.

pub mod archive;
pub mod batch;
pub mod bootstrap;
pub mod caption;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod worker;

pub use archive::{ArchiveError, ArchiveProcessor, ArchiveReport};
pub use batch::{list_archives, BatchOrchestrator, BatchOutcome, BatchStats};
pub use caption::{CaptionBackend, CaptionGenerator, ClaudeCaptioner, GatewayCaptioner};
pub use service::run_service;
pub use worker::{Entry, FileWorker};
