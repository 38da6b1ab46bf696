use std::io::{Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use docmeta_common::{ArchiveHandle, ArchiveMetadata, FileRecord, PipelineConfig};
use docmeta_storage::{Storage, StorageError, JSON_CONTENT_TYPE};

use crate::worker::{Entry, FileWorker};

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Largest decompressed entry read into memory.
pub const MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to download {key}: {source}")]
    Download {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("{key} is not a readable zip archive: {reason}")]
    Corrupt { key: String, reason: String },

    /// The records were computed but the sidecar could not be written.
    #[error("failed to write metadata for {key}: {reason}")]
    Persist {
        key: String,
        reason: String,
        metadata: Box<ArchiveMetadata>,
    },

    #[error("archive task failed: {0}")]
    Task(String),
}

/// Outcome of one archive.
#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub key: String,
    pub metadata_key: String,
    pub metadata: ArchiveMetadata,
    /// False when an existing sidecar was kept because overwrite is off.
    pub written: bool,
}

impl ArchiveReport {
    pub fn entries(&self) -> usize {
        self.metadata.files.len()
    }

    pub fn error_records(&self) -> usize {
        self.metadata.error_count()
    }
}

/// Entry slot produced by container decoding.
type DecodedEntry = std::result::Result<Entry, FileRecord>;

/// Fans the entries of one archive out to [`FileWorker`]s and writes the
/// resulting sidecar.
pub struct ArchiveProcessor {
    storage: Arc<dyn Storage>,
    worker: Arc<FileWorker>,
    max_parallel_tasks: usize,
    overwrite_metadata: bool,
}

impl ArchiveProcessor {
    pub fn new(storage: Arc<dyn Storage>, worker: Arc<FileWorker>, config: &PipelineConfig) -> Self {
        Self {
            storage,
            worker,
            max_parallel_tasks: config.max_parallel_tasks.max(1),
            overwrite_metadata: config.overwrite_metadata,
        }
    }

    /// Download, process and persist one archive.
    pub async fn run(&self, handle: &ArchiveHandle) -> Result<ArchiveReport> {
        let bytes = self
            .storage
            .get(handle.key())
            .await
            .map_err(|source| ArchiveError::Download {
                key: handle.key().to_string(),
                source,
            })?;
        info!(archive = %handle, bytes = bytes.len(), "Processing archive");

        let metadata = self.process_archive(bytes, handle).await?;
        let written = self.persist(handle, &metadata).await?;

        Ok(ArchiveReport {
            key: handle.key().to_string(),
            metadata_key: handle.metadata_key().to_string(),
            metadata,
            written,
        })
    }

    /// Build the metadata for an archive's bytes. One record per file entry;
    /// record order is completion order.
    pub async fn process_archive(&self, bytes: Bytes, handle: &ArchiveHandle) -> Result<ArchiveMetadata> {
        let key = handle.key().to_string();
        let slots = tokio::task::spawn_blocking(move || decode_entries(bytes, MAX_ENTRY_BYTES))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
            .map_err(|e| ArchiveError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;

        debug!(archive = %handle, entries = slots.len(), "Archive decoded");

        let permits = Arc::new(Semaphore::new(self.max_parallel_tasks));
        let mut records = Vec::with_capacity(slots.len());
        let mut pending = FuturesUnordered::new();

        for slot in slots {
            match slot {
                Ok(entry) => {
                    let permits = permits.clone();
                    let worker = self.worker.clone();
                    pending.push(async move {
                        let _permit = match permits.acquire_owned().await {
                            Ok(p) => p,
                            Err(_) => return FileRecord::failed(entry.name, "worker pool closed"),
                        };
                        worker.process(entry).await
                    });
                }
                Err(record) => records.push(record),
            }
        }

        while let Some(record) = pending.next().await {
            records.push(record);
        }

        let metadata = ArchiveMetadata::new(key, records);
        info!(
            archive = %handle,
            files = metadata.files.len(),
            errors = metadata.error_count(),
            "Archive processed"
        );
        Ok(metadata)
    }

    /// Write the sidecar. Returns false when an existing sidecar was kept.
    pub async fn persist(&self, handle: &ArchiveHandle, metadata: &ArchiveMetadata) -> Result<bool> {
        let persist_error = |reason: String| ArchiveError::Persist {
            key: handle.key().to_string(),
            reason,
            metadata: Box::new(metadata.clone()),
        };

        if !self.overwrite_metadata {
            match self.storage.head_exists(handle.metadata_key()).await {
                Ok(true) => {
                    info!(
                        archive = %handle,
                        sidecar = handle.metadata_key(),
                        "Sidecar exists and overwrite is off, keeping it"
                    );
                    return Ok(false);
                }
                Ok(false) => {}
                Err(e) => return Err(persist_error(e.to_string())),
            }
        }

        let body = metadata
            .to_json_bytes()
            .map_err(|e| persist_error(e.to_string()))?;
        self.storage
            .put(handle.metadata_key(), Bytes::from(body), JSON_CONTENT_TYPE)
            .await
            .map_err(|e| persist_error(e.to_string()))?;

        info!(archive = %handle, sidecar = handle.metadata_key(), "Sidecar written");
        Ok(true)
    }
}

/// Read every file entry into memory. Directory entries are skipped. An
/// entry that fails to decompress, or inflates past `max_entry_bytes`,
/// becomes an error record. Consumes the archive bytes so they are released
/// once decoding finishes.
fn decode_entries(bytes: Bytes, max_entry_bytes: u64) -> zip::result::ZipResult<Vec<DecodedEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut slots = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let fallback_name = archive
            .name_for_index(index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("entry-{index}"));

        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!(entry = %fallback_name, error = %e, "Unreadable archive entry");
                slots.push(Err(FileRecord::failed(fallback_name, e)));
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let capacity = file.size().min(max_entry_bytes).min(64 * 1024 * 1024);
        let mut body = Vec::with_capacity(capacity as usize);
        match (&mut file).take(max_entry_bytes + 1).read_to_end(&mut body) {
            Ok(read) if read as u64 > max_entry_bytes => {
                warn!(entry = %name, limit = max_entry_bytes, "Entry too large");
                slots.push(Err(FileRecord::failed(
                    name,
                    format!("entry exceeds {max_entry_bytes} bytes"),
                )));
            }
            Ok(_) => slots.push(Ok(Entry::new(name, body))),
            Err(e) => {
                warn!(entry = %name, error = %e, "Entry failed to decompress");
                slots.push(Err(FileRecord::failed(name, e)));
            }
        }
    }

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{corrupt_payload, jpeg_stub, test_processor, MockCaptioner, MockOcr, ZipFixture};
    use docmeta_storage::MemoryStore;

    #[test]
    fn decode_skips_directories_and_flags_damaged_entries() {
        let zip = ZipFixture::new()
            .dir("scans/")
            .file("scans/a.jpg", jpeg_stub("a"))
            .file("scans/b.jpg", b"DAMAGED-PAYLOAD-BYTES")
            .build();
        let zip = corrupt_payload(&zip, b"DAMAGED-PAYLOAD-BYTES");

        let slots = decode_entries(zip, MAX_ENTRY_BYTES).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(matches!(&slots[0], Ok(e) if e.name == "scans/a.jpg"));
        assert!(matches!(&slots[1], Err(r) if r.file_name == "scans/b.jpg" && r.is_error()));
    }

    #[test]
    fn decode_rejects_non_zip() {
        assert!(decode_entries(Bytes::from_static(b"not a zip at all"), MAX_ENTRY_BYTES).is_err());
    }

    #[test]
    fn entries_past_the_size_cap_become_error_records() {
        let zip = ZipFixture::new()
            .file("fits.bin", [7u8; 8])
            .file("huge.bin", [7u8; 32])
            .build();

        let slots = decode_entries(zip, 8).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(matches!(&slots[0], Ok(e) if e.name == "fits.bin" && e.bytes.len() == 8));
        match &slots[1] {
            Err(record) => {
                assert_eq!(record.file_name, "huge.bin");
                assert!(record.is_error());
                assert!(record.file_caption.contains("exceeds 8 bytes"), "{}", record.file_caption);
            }
            Ok(entry) => panic!("{} should have been rejected", entry.name),
        }
    }

    #[tokio::test]
    async fn empty_archive_yields_empty_file_list() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new().with_object("empty.zip", ZipFixture::new().build()));
        let processor = test_processor(
            store.clone(),
            Arc::new(MockOcr::new()),
            Arc::new(MockCaptioner::new()),
            &PipelineConfig::default(),
            scratch.path(),
        );

        let report = processor.run(&ArchiveHandle::new("empty.zip").unwrap()).await.unwrap();
        assert_eq!(report.entries(), 0);
        assert!(report.written);
        let stored = store.object("empty.json").unwrap();
        let meta: ArchiveMetadata = serde_json::from_slice(&stored.body).unwrap();
        assert_eq!(meta, ArchiveMetadata::new("empty.zip", vec![]));
        assert_eq!(stored.content_type, JSON_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn persist_failure_carries_the_records() {
        let scratch = tempfile::tempdir().unwrap();
        let zip = ZipFixture::new().file("a.jpg", jpeg_stub("a")).build();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("a.zip", zip)
                .failing_put("a.json"),
        );
        let processor = test_processor(
            store,
            Arc::new(MockOcr::new()),
            Arc::new(MockCaptioner::new()),
            &PipelineConfig::default(),
            scratch.path(),
        );

        match processor.run(&ArchiveHandle::new("a.zip").unwrap()).await {
            Err(ArchiveError::Persist { metadata, .. }) => {
                assert_eq!(metadata.files, vec![FileRecord::new("a.jpg", "a.jpg")]);
            }
            other => panic!("expected persist failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn existing_sidecar_is_kept_when_overwrite_is_off() {
        let scratch = tempfile::tempdir().unwrap();
        let zip = ZipFixture::new().file("a.jpg", jpeg_stub("a")).build();
        let store = Arc::new(
            MemoryStore::new()
                .with_object("a.zip", zip)
                .with_object("a.json", "{\"keep\":true}"),
        );
        let config = PipelineConfig {
            overwrite_metadata: false,
            ..Default::default()
        };
        let processor = test_processor(
            store.clone(),
            Arc::new(MockOcr::new()),
            Arc::new(MockCaptioner::new()),
            &config,
            scratch.path(),
        );

        let report = processor.run(&ArchiveHandle::new("a.zip").unwrap()).await.unwrap();
        assert!(!report.written);
        assert_eq!(store.put_count(), 0);
        assert_eq!(&store.object("a.json").unwrap().body[..], b"{\"keep\":true}");
    }

    #[tokio::test]
    async fn missing_archive_is_a_download_error() {
        let scratch = tempfile::tempdir().unwrap();
        let processor = test_processor(
            Arc::new(MemoryStore::new()),
            Arc::new(MockOcr::new()),
            Arc::new(MockCaptioner::new()),
            &PipelineConfig::default(),
            scratch.path(),
        );
        let err = processor
            .run(&ArchiveHandle::new("gone.zip").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Download { .. }));
    }
}
