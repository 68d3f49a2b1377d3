use crate::keys;
use crate::traits::{ArtifactReader, ArtifactStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Attempts at finding a free key before giving up.
const MAX_SAVE_ATTEMPTS: usize = 16;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at `base_path` (e.g. "/var/lib/mediafiles")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path, rejecting traversal
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        keys::validate_key(storage_key)?;
        Ok(self.base_path.join(storage_key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Create `path` exclusively and write `data` into it.
    ///
    /// Returns `Ok(false)` if the file already exists.
    async fn write_new(&self, path: &Path, data: &[u8]) -> StorageResult<bool> {
        self.ensure_parent_dir(path).await?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Ok(true)
    }
}

#[async_trait]
impl ArtifactStore for LocalStorage {
    async fn open(&self, storage_key: &str) -> StorageResult<ArtifactReader> {
        let path = self.key_to_path(storage_key)?;

        match fs::File::open(&path).await {
            Ok(file) => {
                tracing::debug!(path = %path.display(), key = %storage_key, "Local storage open");
                Ok(Box::pin(file))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => Err(StorageError::DownloadFailed(format!(
                "Failed to open file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn save(&self, data: Bytes, suggested_name: &str) -> StorageResult<String> {
        let preferred = keys::normalize_name(suggested_name)?;
        let size = data.len();
        let start = std::time::Instant::now();

        let mut key = preferred.clone();
        for _ in 0..MAX_SAVE_ATTEMPTS {
            let path = self.key_to_path(&key)?;
            if self.write_new(&path, &data).await? {
                tracing::info!(
                    path = %path.display(),
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage save successful"
                );
                return Ok(key);
            }
            tracing::debug!(key = %key, "Storage key taken, trying alternative");
            key = keys::alternative_name(&preferred);
        }

        Err(StorageError::UploadFailed(format!(
            "Could not find a free key for {} after {} attempts",
            preferred, MAX_SAVE_ATTEMPTS
        )))
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_storage_save_and_read() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let key = storage
            .save(Bytes::from_static(b"test data"), "file/test.TXT")
            .await
            .unwrap();

        assert_eq!(key, "file/test.txt");
        assert!(dir.path().join("file/test.txt").exists());
        assert_eq!(storage.read_all(&key).await.unwrap(), b"test data");
    }

    #[tokio::test]
    async fn test_save_never_overwrites() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let first = storage
            .save(Bytes::from_static(b"one"), "imagefile/a.png")
            .await
            .unwrap();
        let second = storage
            .save(Bytes::from_static(b"two"), "imagefile/a.png")
            .await
            .unwrap();

        assert_eq!(first, "imagefile/a.png");
        assert_ne!(first, second);
        assert!(second.starts_with("imagefile/a_"));
        assert!(second.ends_with(".png"));
        assert_eq!(storage.read_all(&first).await.unwrap(), b"one");
        assert_eq!(storage.read_all(&second).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.open("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.save(Bytes::from_static(b"x"), "../escape.txt").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.open("file/missing.bin").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_and_exists() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(storage.delete("nonexistent/file.txt").await.is_ok());

        let key = storage
            .save(Bytes::from_static(b"test"), "exists.txt")
            .await
            .unwrap();
        assert!(storage.exists(&key).await.unwrap());
        storage.delete(&key).await.unwrap();
        assert!(!storage.exists(&key).await.unwrap());
    }
}
