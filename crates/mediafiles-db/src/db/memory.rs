//! In-process media repository

use async_trait::async_trait;
use chrono::Utc;
use mediafiles_core::{
    ImageAttributes, MediaKind, MediaRecord, NewMediaRecord, OwnerRef, ProcessingStatus,
    StagedChanges, VideoAttributes,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::MediaRepository;

/// Keeps only what a user may set on creation: image settings survive,
/// derived fields and construction-time settings do not.
fn editable_kind(kind: &MediaKind) -> MediaKind {
    match kind {
        MediaKind::File => MediaKind::File,
        MediaKind::Document => MediaKind::Document,
        MediaKind::Image(attrs) => MediaKind::Image(ImageAttributes {
            compression_quality: attrs.compression_quality,
            thumbnail_size: attrs.thumbnail_size.clone(),
            ..ImageAttributes::default()
        }),
        MediaKind::Video(_) => MediaKind::Video(VideoAttributes::default()),
    }
}

/// Repository backed by a mutex-guarded map.
///
/// The single mutex serialises every operation, which gives the same
/// guarantees as the row lock used by the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryMediaRepository {
    records: Arc<Mutex<HashMap<i64, MediaRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryMediaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

fn key_in_use(records: &HashMap<i64, MediaRecord>, key: &str, except: Option<i64>) -> bool {
    records
        .values()
        .any(|r| r.storage_key == key && Some(r.id) != except)
}

#[async_trait]
impl MediaRepository for InMemoryMediaRepository {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, new: NewMediaRecord) -> RepositoryResult<MediaRecord> {
        let mut records = self.records.lock().await;
        if key_in_use(&records, &new.storage_key, None) {
            return Err(RepositoryError::DuplicateKey(new.storage_key));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();
        let stored = MediaRecord {
            id,
            storage_key: new.storage_key,
            mime_type: None,
            status: ProcessingStatus::Pending,
            owner: new.owner,
            kind: editable_kind(&new.kind),
            created_at: now,
            updated_at: now,
        };
        records.insert(id, stored.clone());

        let mut record = stored;
        record.kind.carry_transient_from(&new.kind);
        Ok(record)
    }

    async fn save(&self, record: &MediaRecord) -> RepositoryResult<MediaRecord> {
        let mut records = self.records.lock().await;
        if key_in_use(&records, &record.storage_key, Some(record.id)) {
            return Err(RepositoryError::DuplicateKey(record.storage_key.clone()));
        }

        let stored = records
            .get_mut(&record.id)
            .ok_or(RepositoryError::NotFound(record.id))?;

        if stored.variant() != record.variant() {
            return Err(RepositoryError::VariantMismatch {
                id: record.id,
                from: stored.variant().to_string(),
                to: record.variant().to_string(),
            });
        }

        if stored.storage_key != record.storage_key {
            stored.status = ProcessingStatus::Pending;
            stored.storage_key = record.storage_key.clone();
        }
        stored.owner = record.owner.clone();
        if let (MediaKind::Image(dst), MediaKind::Image(src)) = (&mut stored.kind, &record.kind) {
            dst.compression_quality = src.compression_quality;
            dst.thumbnail_size = src.thumbnail_size.clone();
        }
        stored.updated_at = Utc::now();

        let mut saved = stored.clone();
        saved.kind.carry_transient_from(&record.kind);
        Ok(saved)
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<MediaRecord>> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn claim_for_processing(&self, id: i64, source_key: &str) -> RepositoryResult<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(record)
                if record.status == ProcessingStatus::Pending
                    && record.storage_key == source_key =>
            {
                record.status = ProcessingStatus::Processing;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply_changes(
        &self,
        id: i64,
        source_key: &str,
        changes: &StagedChanges,
    ) -> RepositoryResult<bool> {
        let mut records = self.records.lock().await;

        if let Some(mediafiles_core::FieldChange::StorageKey(new_key)) =
            changes.get(mediafiles_core::DerivedField::StorageKey)
        {
            if key_in_use(&records, new_key, Some(id)) {
                return Err(RepositoryError::DuplicateKey(new_key.clone()));
            }
        }

        match records.get_mut(&id) {
            Some(record) if record.storage_key == source_key => {
                record.apply_changes(changes);
                record.status = ProcessingStatus::Success;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: i64, source_key: &str) -> RepositoryResult<bool> {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(record) if record.storage_key == source_key => {
                record.status = ProcessingStatus::Failed;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_owner(&self, owner: &OwnerRef) -> RepositoryResult<Vec<MediaRecord>> {
        let records = self.records.lock().await;
        let mut owned: Vec<MediaRecord> = records
            .values()
            .filter(|r| r.owner.as_ref() == Some(owner))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(owned)
    }
}
