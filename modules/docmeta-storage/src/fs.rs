use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::Storage;

/// Storage backed by a local directory. Key `a/b.zip` maps to `<root>/a/b.zip`.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let safe = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl Storage for FsStore {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let root_key = self.root.display().to_string();
        if !tokio::fs::try_exists(&self.root)
            .await
            .map_err(|e| StorageError::io(&root_key, e))?
        {
            return Err(StorageError::Unavailable(format!(
                "storage root {root_key} does not exist"
            )));
        }

        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::io(dir.display().to_string(), e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(dir.display().to_string(), e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(entry.path().display().to_string(), e))?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    // Half-written uploads are invisible to listing.
                    if is_partial(&path) {
                        continue;
                    }
                    if let Some(key) = self.key_for(&path) {
                        if prefix.map_or(true, |p| key.starts_with(p)) {
                            keys.push(key);
                        }
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_for(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(key, e))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(key, e))?;
        }

        // Write beside the target, then rename, so readers never see a torn file.
        let tmp = path.with_file_name(format!(
            ".{}.{}.partial",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("object"),
            Uuid::new_v4()
        ));
        if let Err(e) = tokio::fs::write(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io(key, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io(key, e));
        }

        debug!(key, content_type, bytes = body.len(), "Stored object");
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    fn name(&self) -> &str {
        "fs"
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.') && n.ends_with(".partial"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JSON_CONTENT_TYPE;

    #[tokio::test]
    async fn put_get_list_roundtrip_with_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store
            .put("in/2024/a.zip", Bytes::from_static(b"zip"), "application/zip")
            .await
            .unwrap();
        store
            .put("in/2024/a.json", Bytes::from_static(b"{}"), JSON_CONTENT_TYPE)
            .await
            .unwrap();
        store
            .put("b.zip", Bytes::from_static(b"zip"), "application/zip")
            .await
            .unwrap();

        assert_eq!(
            store.list(None).await.unwrap(),
            vec!["b.zip", "in/2024/a.json", "in/2024/a.zip"]
        );
        assert_eq!(
            store.list(Some("in/")).await.unwrap(),
            vec!["in/2024/a.json", "in/2024/a.zip"]
        );
        assert_eq!(&store.get("in/2024/a.json").await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn head_and_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store
            .put("a.json", Bytes::from_static(b"{}"), JSON_CONTENT_TYPE)
            .await
            .unwrap();

        assert!(store.head_exists("a.json").await.unwrap());
        assert!(!store.head_exists("b.json").await.unwrap());
        assert!(matches!(
            store.get("b.json").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn put_overwrites_and_leaves_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.put("a.json", Bytes::from_static(b"1"), JSON_CONTENT_TYPE).await.unwrap();
        store.put("a.json", Bytes::from_static(b"2"), JSON_CONTENT_TYPE).await.unwrap();

        assert_eq!(&store.get("a.json").await.unwrap()[..], b"2");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["a.json"]);
    }

    #[tokio::test]
    async fn escaping_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        for key in ["../x.zip", "/etc/passwd", "a/../../b", ""] {
            assert!(
                matches!(store.get(key).await, Err(StorageError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn missing_root_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("nope"));
        assert!(matches!(
            store.list(None).await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
