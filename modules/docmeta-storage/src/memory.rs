use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StorageError};
use crate::Storage;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    failing_gets: HashSet<String>,
    failing_puts: HashSet<String>,
    list_unavailable: bool,
    puts: usize,
}

/// In-process store. Builder methods inject failures for resilience tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, key: &str, body: impl Into<Bytes>) -> Self {
        self.insert(key, body, "application/octet-stream");
        self
    }

    pub fn failing_get(self, key: &str) -> Self {
        self.lock().failing_gets.insert(key.to_string());
        self
    }

    pub fn failing_put(self, key: &str) -> Self {
        self.lock().failing_puts.insert(key.to_string());
        self
    }

    pub fn unavailable(self) -> Self {
        self.lock().list_unavailable = true;
        self
    }

    pub fn insert(&self, key: &str, body: impl Into<Bytes>, content_type: &str) {
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.lock().puts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let inner = self.lock();
        if inner.list_unavailable {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(inner
            .objects
            .keys()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let inner = self.lock();
        if inner.failing_gets.contains(key) {
            return Err(StorageError::Unavailable(format!("injected get failure for {key}")));
        }
        inner
            .objects
            .get(key)
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.failing_puts.contains(key) {
            return Err(StorageError::Unavailable(format!("injected put failure for {key}")));
        }
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        inner.puts += 1;
        Ok(())
    }

    async fn head_exists(&self, key: &str) -> Result<bool> {
        Ok(self.lock().objects.contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_sorted_and_prefix_filtered() {
        let store = MemoryStore::new()
            .with_object("b.zip", "b")
            .with_object("a.zip", "a")
            .with_object("x/c.zip", "c");
        assert_eq!(store.list(None).await.unwrap(), vec!["a.zip", "b.zip", "x/c.zip"]);
        assert_eq!(store.list(Some("x/")).await.unwrap(), vec!["x/c.zip"]);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_errors() {
        let store = MemoryStore::new()
            .with_object("a.zip", "a")
            .failing_get("a.zip")
            .failing_put("a.json");
        assert!(store.get("a.zip").await.is_err());
        assert!(store
            .put("a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .is_err());
        assert_eq!(store.put_count(), 0);
        assert!(!store.head_exists("a.json").await.unwrap());
    }
}
