//! Runs one processing job to a terminal status

use mediafiles_core::{ProcessingStatus, ProcessorParams, StagedChanges};
use mediafiles_db::MediaRepository;
use mediafiles_processing::{CommitOutcome, ProcessingError, ProcessorRegistry};
use mediafiles_storage::ArtifactStore;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::dispatch::ProcessFileTask;

/// How a job ended. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Succeeded,
    /// The record no longer points at the processed source; nothing was written.
    Superseded,
    Failed(String),
    Missing,
}

impl Display for ProcessingOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessingOutcome::Succeeded => write!(f, "succeeded"),
            ProcessingOutcome::Superseded => write!(f, "superseded"),
            ProcessingOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            ProcessingOutcome::Missing => write!(f, "missing"),
        }
    }
}

#[derive(Clone)]
pub struct ProcessingExecutor {
    registry: Arc<ProcessorRegistry>,
    store: Arc<dyn ArtifactStore>,
    repository: Arc<dyn MediaRepository>,
}

impl ProcessingExecutor {
    pub fn new(
        registry: Arc<ProcessorRegistry>,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
    ) -> Self {
        Self {
            registry,
            store,
            repository,
        }
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    pub fn repository(&self) -> &Arc<dyn MediaRepository> {
        &self.repository
    }

    /// Process the claim described by `task` and leave the record `success`
    /// or `failed`.
    #[tracing::instrument(
        skip(self, task),
        fields(file_id = task.file_id, storage_key = %task.storage_key, processor = tracing::field::Empty)
    )]
    pub async fn run(&self, task: ProcessFileTask) -> ProcessingOutcome {
        let start = std::time::Instant::now();
        let ProcessFileTask {
            file_id,
            storage_key: source_key,
            params,
        } = task;

        let record = match self.repository.get(file_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(file_id, "Media file disappeared before processing");
                return ProcessingOutcome::Missing;
            }
            Err(e) => {
                tracing::error!(file_id, error = %e, "Failed to load media file for processing");
                return self.fail(file_id, &source_key, &e.to_string()).await;
            }
        };

        // Re-uploaded after this claim was taken; the newer claim owns the record
        if record.storage_key != source_key || record.status != ProcessingStatus::Processing {
            tracing::info!(
                file_id,
                status = %record.status,
                current_key = %record.storage_key,
                "Claim superseded, skipping"
            );
            return ProcessingOutcome::Superseded;
        }

        let result = self.process(record, &params).await;

        let outcome = match result {
            Ok(CommitOutcome::Committed) => ProcessingOutcome::Succeeded,
            Ok(CommitOutcome::Superseded) => ProcessingOutcome::Superseded,
            Ok(CommitOutcome::NothingToCommit) => {
                // Still has to leave `processing`
                match self
                    .repository
                    .apply_changes(file_id, &source_key, &StagedChanges::new())
                    .await
                {
                    Ok(true) => ProcessingOutcome::Succeeded,
                    Ok(false) => ProcessingOutcome::Superseded,
                    Err(e) => self.fail(file_id, &source_key, &e.to_string()).await,
                }
            }
            Err(e) => self.fail(file_id, &source_key, &e.to_string()).await,
        };

        tracing::info!(
            file_id,
            storage_key = %source_key,
            outcome = %outcome,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Processing finished"
        );
        outcome
    }

    async fn process(
        &self,
        record: mediafiles_core::MediaRecord,
        params: &ProcessorParams,
    ) -> Result<CommitOutcome, ProcessingError> {
        let mut processor = self.registry.build(
            record,
            params,
            self.store.clone(),
            self.repository.clone(),
        )?;
        tracing::Span::current().record("processor", processor.name());

        processor.process().await?;
        processor.commit().await
    }

    async fn fail(&self, file_id: i64, source_key: &str, reason: &str) -> ProcessingOutcome {
        tracing::error!(file_id, storage_key = %source_key, error = %reason, "Processing failed");

        match self.repository.mark_failed(file_id, source_key).await {
            Ok(true) => ProcessingOutcome::Failed(reason.to_string()),
            Ok(false) => ProcessingOutcome::Superseded,
            Err(e) => {
                tracing::error!(file_id, error = %e, "Failed to record processing failure");
                ProcessingOutcome::Failed(reason.to_string())
            }
        }
    }
}
