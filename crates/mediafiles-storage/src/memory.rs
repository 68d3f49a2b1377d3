use crate::keys;
use crate::traits::{ArtifactReader, ArtifactStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local blob store. Contents are lost when the last clone is dropped.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    blobs: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under exactly `key`, replacing anything there.
    /// Meant for seeding fixtures; the pipeline itself only uses `save`.
    pub async fn insert(&self, key: &str, data: impl Into<Bytes>) -> StorageResult<()> {
        keys::validate_key(key)?;
        self.blobs.write().await.insert(key.to_string(), data.into());
        Ok(())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryStorage {
    async fn open(&self, key: &str) -> StorageResult<ArtifactReader> {
        keys::validate_key(key)?;
        let blobs = self.blobs.read().await;
        let data = blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn save(&self, data: Bytes, suggested_name: &str) -> StorageResult<String> {
        let preferred = keys::normalize_name(suggested_name)?;
        let size = data.len();
        let mut blobs = self.blobs.write().await;

        let mut key = preferred.clone();
        while blobs.contains_key(&key) {
            key = keys::alternative_name(&preferred);
        }
        blobs.insert(key.clone(), data);

        tracing::debug!(key = %key, size_bytes = size, "In-memory storage save successful");
        Ok(key)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        keys::validate_key(key)?;
        Ok(self.blobs.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        keys::validate_key(key)?;
        self.blobs.write().await.remove(key);
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_open_roundtrip_with_collision() {
        let storage = InMemoryStorage::new();

        let a = storage
            .save(Bytes::from_static(b"a"), "videofile/clip.MP4")
            .await
            .unwrap();
        let b = storage
            .save(Bytes::from_static(b"b"), "videofile/clip.mp4")
            .await
            .unwrap();

        assert_eq!(a, "videofile/clip.mp4");
        assert_ne!(a, b);
        assert!(b.ends_with(".mp4"));
        assert_eq!(storage.read_all(&a).await.unwrap(), b"a");
        assert_eq!(storage.read_all(&b).await.unwrap(), b"b");
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn open_missing_key() {
        let storage = InMemoryStorage::new();
        assert!(matches!(
            storage.open("file/none").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!storage.exists("file/none").await.unwrap());
    }
}
