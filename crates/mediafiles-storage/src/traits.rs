//! Storage abstraction trait

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Readable handle returned by [`ArtifactStore::open`]
pub type ArtifactReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Blob store for primary files and derived artifacts.
///
/// Writes never replace existing blobs: [`save`](ArtifactStore::save) picks a
/// free key when the suggested one is taken, so re-processing always yields new
/// keys and the previous blobs stay in place until deleted explicitly.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Open a blob for reading. Fails with [`StorageError::NotFound`] if absent.
    async fn open(&self, key: &str) -> StorageResult<ArtifactReader>;

    /// Store `data` and return its key.
    ///
    /// The key is derived from `suggested_name` with its extension lower-cased.
    /// If that key already exists an alternative `{stem}_{random}{ext}` is used.
    async fn save(&self, data: Bytes, suggested_name: &str) -> StorageResult<String>;

    /// Check if a blob exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Read a whole blob into memory
    async fn read_all(&self, key: &str) -> StorageResult<Vec<u8>> {
        let mut reader = self.open(key).await?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to read {}: {}", key, e)))?;
        Ok(buf)
    }
}
