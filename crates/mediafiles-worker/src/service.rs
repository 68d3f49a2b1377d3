//! Upload and save entry points
//!
//! Every write goes through the same sequence: persist the row, let the
//! coordinator decide on processing, then commit the unit of work so the
//! registered processing starts only after the row is durable.

use bytes::Bytes;
use mediafiles_core::{MediaKind, MediaRecord, NewMediaRecord, OwnerRef};
use mediafiles_db::{MediaRepository, RepositoryError};
use mediafiles_processing::{MimeTypeValidator, ProcessingError, ValidationError};
use mediafiles_storage::keys::upload_key;
use mediafiles_storage::{ArtifactStore, StorageError};
use std::sync::Arc;
use thiserror::Error;

use crate::coordinator::{Dispatch, ProcessingCoordinator};
use crate::unit_of_work::UnitOfWork;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error("Media file {0} not found")]
    NotFound(i64),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A new upload before it has a storage key
#[derive(Debug, Clone)]
pub struct NewMedia {
    pub kind: MediaKind,
    pub owner: Option<OwnerRef>,
}

impl NewMedia {
    pub fn new(kind: MediaKind) -> Self {
        Self { kind, owner: None }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }
}

#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn MediaRepository>,
    coordinator: ProcessingCoordinator,
}

impl MediaService {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
        coordinator: ProcessingCoordinator,
    ) -> Self {
        Self {
            store,
            repository,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &ProcessingCoordinator {
        &self.coordinator
    }

    fn validator(&self, kind: &MediaKind) -> ServiceResult<MimeTypeValidator> {
        let sniffer = self.coordinator.executor().registry().settings().sniffer();
        Ok(MimeTypeValidator::for_variant(kind.variant())?.with_sniffer(sniffer))
    }

    /// Store the blob under a fresh key after checking its content type.
    async fn store_upload(
        &self,
        kind: &MediaKind,
        data: Bytes,
        filename: &str,
    ) -> ServiceResult<String> {
        let mime_type = self.validator(kind)?.validate_bytes(&data)?;
        let key = self
            .store
            .save(data, &upload_key(kind.variant(), filename))
            .await?;
        tracing::debug!(key = %key, mime_type = %mime_type, "Upload stored");
        Ok(key)
    }

    async fn after_save(&self, record: &MediaRecord, created: bool) -> ServiceResult<MediaRecord> {
        let mut uow = UnitOfWork::new();
        let dispatch = match self.coordinator.on_saved(record, created, &mut uow).await {
            Ok(dispatch) => dispatch,
            Err(e) => {
                uow.rollback();
                return Err(e.into());
            }
        };
        if let Dispatch::Skipped(reason) = dispatch {
            tracing::debug!(file_id = record.id, reason = %reason, "Processing skipped");
        }
        uow.commit().await;

        Ok(self
            .repository
            .get(record.id)
            .await?
            .unwrap_or_else(|| record.clone()))
    }

    /// Validate, store and register a new file, then trigger processing.
    #[tracing::instrument(skip(self, media, data), fields(size_bytes = data.len()))]
    pub async fn upload(
        &self,
        media: NewMedia,
        data: Bytes,
        filename: &str,
    ) -> ServiceResult<MediaRecord> {
        let key = self.store_upload(&media.kind, data, filename).await?;

        let mut new = NewMediaRecord::new(key, media.kind);
        if let Some(owner) = media.owner {
            new = new.with_owner(owner);
        }

        let record = self.repository.insert(new).await?;
        tracing::info!(file_id = record.id, key = %record.storage_key, "Media file created");
        self.after_save(&record, true).await
    }

    /// Persist user-editable fields. A new storage key restarts processing.
    pub async fn save(&self, record: &MediaRecord) -> ServiceResult<MediaRecord> {
        let saved = self.repository.save(record).await?;
        self.after_save(&saved, false).await
    }

    /// Swap the file behind an existing record.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn replace_file(
        &self,
        id: i64,
        data: Bytes,
        filename: &str,
    ) -> ServiceResult<MediaRecord> {
        let mut record = self
            .repository
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound(id))?;

        let key = self.store_upload(&record.kind, data, filename).await?;
        tracing::info!(
            file_id = id,
            old_key = %record.storage_key,
            new_key = %key,
            "Replacing media file"
        );
        record.storage_key = key;
        self.save(&record).await
    }

    pub async fn get(&self, id: i64) -> ServiceResult<Option<MediaRecord>> {
        Ok(self.repository.get(id).await?)
    }

    pub async fn list_for_owner(&self, owner: &OwnerRef) -> ServiceResult<Vec<MediaRecord>> {
        Ok(self.repository.list_by_owner(owner).await?)
    }
}
