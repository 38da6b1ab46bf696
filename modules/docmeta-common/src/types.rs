use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DocMetaError;

/// Prefix carried by a caption when the entry could not be processed.
/// Consumers detect degraded extraction by checking for it.
pub const ERROR_MARKER: &str = "Error: ";

const ARCHIVE_EXTENSION: &str = ".zip";
const METADATA_EXTENSION: &str = "json";

// =============================================================================
// Persisted sidecar
// =============================================================================

/// One entry's caption. Exactly one per archive entry, failures included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_name: String,
    pub file_caption: String,
}

impl FileRecord {
    pub fn new(file_name: impl Into<String>, file_caption: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_caption: file_caption.into(),
        }
    }

    /// Record for an entry whose processing failed.
    pub fn failed(file_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::new(file_name, error_caption(message))
    }

    pub fn is_error(&self) -> bool {
        is_error_caption(&self.file_caption)
    }
}

/// The JSON artifact written next to each archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub zip_file_name: String,
    pub files: Vec<FileRecord>,
}

impl ArchiveMetadata {
    pub fn new(zip_file_name: impl Into<String>, files: Vec<FileRecord>) -> Self {
        Self {
            zip_file_name: zip_file_name.into(),
            files,
        }
    }

    pub fn error_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_error()).count()
    }

    /// Pretty UTF-8 JSON. Non-ASCII text is written verbatim, never `\u` escaped.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, DocMetaError> {
        serde_json::to_vec_pretty(self).map_err(|e| DocMetaError::Serialization(e.to_string()))
    }
}

pub fn error_caption(message: impl fmt::Display) -> String {
    format!("{ERROR_MARKER}{message}")
}

pub fn is_error_caption(caption: &str) -> bool {
    caption.starts_with(ERROR_MARKER)
}

// =============================================================================
// ArchiveHandle
// =============================================================================

/// Storage key of a zip archive plus its derived sidecar key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveHandle {
    key: String,
    metadata_key: String,
}

impl ArchiveHandle {
    pub fn new(key: impl Into<String>) -> Result<Self, DocMetaError> {
        let key = key.into();
        if key.trim().is_empty() || key.ends_with('/') {
            return Err(DocMetaError::InvalidKey(key));
        }
        let metadata_key = metadata_key_for(&key);
        Ok(Self { key, metadata_key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn metadata_key(&self) -> &str {
        &self.metadata_key
    }

    /// Whether the key names a zip archive (case-insensitive extension match).
    pub fn is_archive_key(key: &str) -> bool {
        ends_with_ignore_case(key, ARCHIVE_EXTENSION)
    }
}

impl fmt::Display for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Replace the extension of the last path segment with `.json`,
/// or append it when the segment has none.
pub fn metadata_key_for(key: &str) -> String {
    let segment_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    let segment = &key[segment_start..];
    match segment.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{METADATA_EXTENSION}", &key[..segment_start + dot]),
        _ => format!("{key}.{METADATA_EXTENSION}"),
    }
}

pub(crate) fn ends_with_ignore_case(s: &str, suffix: &str) -> bool {
    s.len() >= suffix.len()
        && s.is_char_boundary(s.len() - suffix.len())
        && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}
