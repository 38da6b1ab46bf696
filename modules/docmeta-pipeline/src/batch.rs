use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use docmeta_common::{metadata_key_for, ArchiveHandle};
use docmeta_storage::{Storage, StorageError};

use crate::archive::{ArchiveError, ArchiveProcessor, ArchiveReport};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub archives_listed: usize,
    pub archives_processed: usize,
    pub archives_failed: usize,
    pub sidecars_written: usize,
    pub sidecars_kept: usize,
    pub entries: usize,
    pub error_records: usize,
}

impl BatchStats {
    fn record(&mut self, report: &ArchiveReport) {
        self.archives_processed += 1;
        self.entries += report.entries();
        self.error_records += report.error_records();
        if report.written {
            self.sidecars_written += 1;
        } else {
            self.sidecars_kept += 1;
        }
    }
}

impl fmt::Display for BatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "archives: {} listed, {} processed, {} failed | sidecars: {} written, {} kept | entries: {} ({} errors)",
            self.archives_listed,
            self.archives_processed,
            self.archives_failed,
            self.sidecars_written,
            self.sidecars_kept,
            self.entries,
            self.error_records,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Another run held the guard.
    Skipped,
    Completed(BatchStats),
}

/// Zip archives in storage. With `only_new`, archives that already have a
/// sidecar are left out; both the extension and the sidecar match ignore case.
pub async fn list_archives(storage: &dyn Storage, only_new: bool) -> Result<Vec<ArchiveHandle>, StorageError> {
    let keys = storage.list(None).await?;

    let sidecars: HashSet<String> = if only_new {
        keys.iter()
            .map(|k| k.to_lowercase())
            .filter(|k| k.ends_with(".json"))
            .collect()
    } else {
        HashSet::new()
    };

    let mut handles = Vec::new();
    for key in keys.into_iter().filter(|k| ArchiveHandle::is_archive_key(k)) {
        if only_new && sidecars.contains(&metadata_key_for(&key).to_lowercase()) {
            continue;
        }
        match ArchiveHandle::new(key) {
            Ok(handle) => handles.push(handle),
            Err(e) => warn!(error = %e, "Skipping unusable archive key"),
        }
    }
    Ok(handles)
}

/// Runs every listed archive through the [`ArchiveProcessor`], one batch at a
/// time. A second call while a batch is in flight returns
/// [`BatchOutcome::Skipped`].
pub struct BatchOrchestrator {
    storage: Arc<dyn Storage>,
    processor: Arc<ArchiveProcessor>,
    max_parallel_archives: usize,
    running: AtomicBool,
}

/// Clears the running flag however the batch ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchOrchestrator {
    pub fn new(storage: Arc<dyn Storage>, processor: Arc<ArchiveProcessor>, max_parallel_archives: usize) -> Self {
        Self {
            storage,
            processor,
            max_parallel_archives: max_parallel_archives.max(1),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn run_batch(&self, only_new: bool) -> Result<BatchOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Previous batch still running, skipping this run");
            return Ok(BatchOutcome::Skipped);
        }
        let _guard = RunGuard(&self.running);

        let started = Instant::now();
        let handles = list_archives(self.storage.as_ref(), only_new)
            .await
            .with_context(|| format!("Failed to list archives in {} storage", self.storage.name()))?;

        let mut stats = BatchStats {
            archives_listed: handles.len(),
            ..Default::default()
        };
        info!(archives = handles.len(), only_new, "Batch started");

        let mut runs = stream::iter(handles.into_iter().map(|handle| async move {
            let result = self.processor.run(&handle).await;
            (handle, result)
        }))
        .buffer_unordered(self.max_parallel_archives);

        while let Some((handle, result)) = runs.next().await {
            match result {
                Ok(report) => {
                    debug!(
                        archive = %handle,
                        entries = report.entries(),
                        errors = report.error_records(),
                        written = report.written,
                        "Archive complete"
                    );
                    stats.record(&report);
                }
                Err(e) => {
                    stats.archives_failed += 1;
                    match &e {
                        ArchiveError::Persist { metadata, .. } => error!(
                            archive = %handle,
                            records = metadata.files.len(),
                            error = %e,
                            "Archive processed but metadata was not saved"
                        ),
                        _ => error!(archive = %handle, error = %e, "Archive failed"),
                    }
                }
            }
        }

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Batch complete. {stats}");
        Ok(BatchOutcome::Completed(stats))
    }
}
