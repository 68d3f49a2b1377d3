//! Shared processor lifecycle
//!
//! A [`ProcessorBase`] owns everything one processing run needs: the record
//! snapshot, the loaded source bytes, the staged changes and the scratch files.
//! Processors wrap it and only ever talk to persistence through [`ProcessorBase::commit`].

use bytes::Bytes;
use mediafiles_core::{DerivedField, FieldChange, MediaRecord, StagedChanges};
use mediafiles_db::MediaRepository;
use mediafiles_storage::ArtifactStore;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;

use crate::error::{ProcessingError, ProcessingResult};

/// Lifecycle stage of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStage {
    Idle,
    Loaded,
    ChangesPending,
    Committed,
    Failed,
}

/// Result of [`ProcessorBase::commit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Changes and `success` status written.
    Committed,
    /// Nothing was staged, so nothing was written.
    NothingToCommit,
    /// The record was re-uploaded while processing; the changes were dropped.
    Superseded,
}

/// Scratch files owned by one processor.
///
/// Every tracked file is removed by [`release`](ScratchFiles::release) or,
/// failing that, when the set is dropped.
#[derive(Debug, Default)]
pub struct ScratchFiles {
    paths: Vec<TempPath>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty, uniquely named file and track it.
    pub fn allocate(&mut self, suffix: &str) -> std::io::Result<PathBuf> {
        let path = tempfile::Builder::new()
            .prefix("mediafiles-")
            .suffix(suffix)
            .tempfile()?
            .into_temp_path();
        let owned = path.to_path_buf();
        self.paths.push(path);
        Ok(owned)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Best-effort removal of every tracked file. Failures are logged and
    /// skipped. Returns how many files could not be removed.
    pub fn release(&mut self) -> usize {
        let mut failures = 0;
        for path in self.paths.drain(..) {
            let shown = path.to_path_buf();
            if let Err(e) = path.close() {
                if e.kind() != std::io::ErrorKind::NotFound {
                    failures += 1;
                    tracing::warn!(
                        path = %shown.display(),
                        error = %e,
                        "Failed to remove scratch file"
                    );
                }
            }
        }
        failures
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct ProcessorBase {
    record: MediaRecord,
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn MediaRepository>,
    source: Option<Cursor<Bytes>>,
    changes: StagedChanges,
    scratch: ScratchFiles,
    stage: ProcessorStage,
}

impl ProcessorBase {
    pub fn new(
        record: MediaRecord,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
    ) -> Self {
        Self {
            record,
            store,
            repository,
            source: None,
            changes: StagedChanges::new(),
            scratch: ScratchFiles::new(),
            stage: ProcessorStage::Idle,
        }
    }

    pub fn record(&self) -> &MediaRecord {
        &self.record
    }

    /// Key of the primary blob this run reads from.
    pub fn source_key(&self) -> &str {
        &self.record.storage_key
    }

    pub fn changes(&self) -> &StagedChanges {
        &self.changes
    }

    pub fn stage(&self) -> ProcessorStage {
        self.stage
    }

    pub fn scratch_files(&self) -> &ScratchFiles {
        &self.scratch
    }

    pub fn mark_failed(&mut self) {
        self.stage = ProcessorStage::Failed;
    }

    /// Fetch the primary blob into memory. Only the first call hits the store.
    pub async fn load_source_once(&mut self) -> ProcessingResult<Bytes> {
        if let Some(cursor) = &self.source {
            return Ok(cursor.get_ref().clone());
        }

        let key = self.record.storage_key.clone();
        let start = std::time::Instant::now();
        let data = self.store.read_all(&key).await.map_err(|source| {
            self.stage = ProcessorStage::Failed;
            tracing::error!(file_id = self.record.id, key = %key, error = %source, "Failed to load source");
            ProcessingError::Load {
                key: key.clone(),
                source,
            }
        })?;

        tracing::debug!(
            file_id = self.record.id,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Source loaded into memory"
        );

        let data = Bytes::from(data);
        self.source = Some(Cursor::new(data.clone()));
        if self.stage == ProcessorStage::Idle {
            self.stage = ProcessorStage::Loaded;
        }
        Ok(data)
    }

    /// Rewind the in-memory source. Call before every independent read pass.
    pub fn reset_read_position(&mut self) {
        if let Some(cursor) = &mut self.source {
            cursor.set_position(0);
        }
    }

    /// Reader over the loaded source, at its current position.
    pub async fn source_reader(&mut self) -> ProcessingResult<&mut Cursor<Bytes>> {
        if self.source.is_none() {
            self.load_source_once().await?;
        }
        self.source.as_mut().ok_or_else(|| {
            ProcessingError::Io(std::io::Error::other("source buffer missing after load"))
        })
    }

    /// Record an in-memory change. Nothing is persisted until commit.
    pub fn stage_field_change(&mut self, change: FieldChange) {
        tracing::trace!(file_id = self.record.id, field = %change.field(), "Staged field change");
        self.changes.stage(change);
        self.stage = ProcessorStage::ChangesPending;
    }

    /// Store `data` as a new blob and stage its key on `field`.
    pub async fn stage_artifact(
        &mut self,
        field: DerivedField,
        data: Bytes,
        suggested_name: &str,
    ) -> ProcessingResult<String> {
        if !field.is_artifact() {
            return Err(ProcessingError::Configuration(format!(
                "{} does not hold an artifact key",
                field
            )));
        }

        let size = data.len();
        let key = self
            .store
            .save(data, suggested_name)
            .await
            .map_err(|source| ProcessingError::Store {
                name: suggested_name.to_string(),
                source,
            })?;

        tracing::info!(
            file_id = self.record.id,
            field = %field,
            key = %key,
            size_bytes = size,
            "Artifact stored"
        );

        if let Some(change) = FieldChange::artifact(field, key.clone()) {
            self.stage_field_change(change);
        }
        Ok(key)
    }

    /// Create a tracked scratch file, optionally filled with `initial`.
    pub async fn allocate_temp_file(
        &mut self,
        suffix: &str,
        initial: Option<&[u8]>,
    ) -> ProcessingResult<PathBuf> {
        let path = self.scratch.allocate(suffix)?;
        if let Some(bytes) = initial {
            tokio::fs::write(&path, bytes).await?;
        }
        Ok(path)
    }

    pub fn release_temp_files(&mut self) {
        let tracked = self.scratch.len();
        let failures = self.scratch.release();
        if tracked > 0 {
            tracing::debug!(
                file_id = self.record.id,
                released = tracked - failures,
                failures,
                "Scratch files released"
            );
        }
    }

    /// Write staged changes plus `status = success` in one update.
    ///
    /// Scratch files are released whatever the outcome.
    pub async fn commit(&mut self) -> ProcessingResult<CommitOutcome> {
        let result = if self.changes.is_empty() {
            Ok(CommitOutcome::NothingToCommit)
        } else {
            self.repository
                .apply_changes(self.record.id, &self.record.storage_key, &self.changes)
                .await
                .map(|applied| {
                    if applied {
                        CommitOutcome::Committed
                    } else {
                        CommitOutcome::Superseded
                    }
                })
                .map_err(ProcessingError::Commit)
        };

        self.release_temp_files();

        match &result {
            Ok(CommitOutcome::Committed) => {
                self.record.apply_changes(&self.changes);
                self.stage = ProcessorStage::Committed;
                tracing::info!(
                    file_id = self.record.id,
                    change_count = self.changes.len(),
                    "Processing changes committed"
                );
            }
            Ok(CommitOutcome::NothingToCommit) => self.stage = ProcessorStage::Committed,
            Ok(CommitOutcome::Superseded) => {
                self.stage = ProcessorStage::Committed;
                tracing::warn!(
                    file_id = self.record.id,
                    source_key = %self.record.storage_key,
                    "Record changed during processing, discarding results"
                );
            }
            Err(e) => {
                self.stage = ProcessorStage::Failed;
                tracing::error!(file_id = self.record.id, error = %e, "Commit failed");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediafiles_core::{MediaKind, NewMediaRecord, ProcessingStatus};
    use mediafiles_db::InMemoryMediaRepository;
    use mediafiles_storage::InMemoryStorage;

    async fn setup(content: &'static [u8]) -> (ProcessorBase, InMemoryMediaRepository, InMemoryStorage) {
        let store = InMemoryStorage::new();
        store.insert("file/source.txt", content).await.unwrap();
        let repo = InMemoryMediaRepository::new();
        let record = repo
            .insert(NewMediaRecord::new("file/source.txt", MediaKind::File))
            .await
            .unwrap();
        repo.claim_for_processing(record.id, &record.storage_key).await.unwrap();

        let base = ProcessorBase::new(record, Arc::new(store.clone()), Arc::new(repo.clone()));
        (base, repo, store)
    }

    #[tokio::test]
    async fn load_is_idempotent() {
        let (mut base, _repo, store) = setup(b"hello").await;
        assert_eq!(base.stage(), ProcessorStage::Idle);

        let first = base.load_source_once().await.unwrap();
        // Removing the blob proves the second call does not hit the store
        store.delete("file/source.txt").await.unwrap();
        let second = base.load_source_once().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(base.stage(), ProcessorStage::Loaded);
    }

    #[tokio::test]
    async fn missing_blob_is_load_error() {
        let (mut base, _repo, store) = setup(b"hello").await;
        store.delete("file/source.txt").await.unwrap();

        let err = base.load_source_once().await.unwrap_err();
        assert!(matches!(err, ProcessingError::Load { .. }));
        assert_eq!(base.stage(), ProcessorStage::Failed);
    }

    #[tokio::test]
    async fn reset_rewinds_reader() {
        use std::io::Read;

        let (mut base, _repo, _store) = setup(b"abcdef").await;
        let reader = base.source_reader().await.unwrap();
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(reader.position(), 3);

        base.reset_read_position();
        assert_eq!(base.source_reader().await.unwrap().position(), 0);
    }

    #[tokio::test]
    async fn stage_artifact_rejects_scalar_fields() {
        let (mut base, _repo, _store) = setup(b"x").await;
        let err = base
            .stage_artifact(DerivedField::Width, Bytes::from_static(b"x"), "file/x")
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn commit_writes_changes_and_success_then_releases_scratch() {
        let (mut base, repo, store) = setup(b"hello").await;
        let scratch = base.allocate_temp_file(".bin", Some(b"tmp")).await.unwrap();
        assert_eq!(std::fs::read(&scratch).unwrap(), b"tmp");

        base.stage_field_change(FieldChange::MimeType("text/plain".to_string()));
        let key = base
            .stage_artifact(
                DerivedField::PreviewKey,
                Bytes::from_static(b"derived"),
                "preview_file/source.txt",
            )
            .await
            .unwrap();
        assert!(store.exists(&key).await.unwrap());
        assert_eq!(base.stage(), ProcessorStage::ChangesPending);

        let outcome = base.commit().await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(base.stage(), ProcessorStage::Committed);
        assert!(!scratch.exists());
        assert!(base.scratch_files().is_empty());

        let stored = repo.get(base.record().id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Success);
        assert_eq!(stored.mime_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn empty_commit_writes_nothing() {
        let (mut base, repo, _store) = setup(b"hello").await;
        assert_eq!(base.commit().await.unwrap(), CommitOutcome::NothingToCommit);
        let stored = repo.get(base.record().id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn superseded_commit_is_dropped() {
        let (mut base, repo, _store) = setup(b"hello").await;
        base.stage_field_change(FieldChange::MimeType("text/plain".to_string()));

        let mut replaced = repo.get(base.record().id).await.unwrap().unwrap();
        replaced.storage_key = "file/other.txt".to_string();
        repo.save(&replaced).await.unwrap();

        assert_eq!(base.commit().await.unwrap(), CommitOutcome::Superseded);
        let stored = repo.get(base.record().id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Pending);
        assert_eq!(stored.mime_type, None);
    }

    #[test]
    fn release_survives_already_deleted_files() {
        let mut scratch = ScratchFiles::new();
        let a = scratch.allocate(".a").unwrap();
        let b = scratch.allocate(".b").unwrap();
        std::fs::remove_file(&a).unwrap();

        assert_eq!(scratch.release(), 0);
        assert!(scratch.is_empty());
        assert!(!b.exists());
    }

    #[test]
    fn drop_releases_scratch_files() {
        let path = {
            let mut scratch = ScratchFiles::new();
            scratch.allocate(".tmp").unwrap()
        };
        assert!(!path.exists());
    }
}
