use async_trait::async_trait;
use mediafiles_core::{MediaRecord, NewMediaRecord, OwnerRef, StagedChanges};

use crate::error::RepositoryResult;

/// Persistence contract for media records.
///
/// Records handed back by [`insert`](MediaRepository::insert) and
/// [`save`](MediaRepository::save) keep the construction-time settings of the
/// input (e.g. an image's `max_size`), while [`get`](MediaRepository::get)
/// only returns what is stored.
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Create a record in `pending` state.
    async fn insert(&self, new: NewMediaRecord) -> RepositoryResult<MediaRecord>;

    /// Persist the user-editable fields of `record`: storage key, owner and
    /// variant settings. Status, MIME type and derived fields are ignored.
    ///
    /// If the stored key differs from `record.storage_key` the status is reset
    /// to `pending`, whatever it was before, so a re-upload is processed again.
    async fn save(&self, record: &MediaRecord) -> RepositoryResult<MediaRecord>;

    async fn get(&self, id: i64) -> RepositoryResult<Option<MediaRecord>>;

    /// Under a row lock, move the record from `pending` to `processing`.
    ///
    /// Returns `false` if the record is missing, not pending, or no longer
    /// points at `source_key`.
    async fn claim_for_processing(&self, id: i64, source_key: &str) -> RepositoryResult<bool>;

    /// Write every staged change plus `status = success` in one statement.
    ///
    /// Only applies while the record still points at `source_key`; returns
    /// `false` when the record was re-uploaded in the meantime.
    async fn apply_changes(
        &self,
        id: i64,
        source_key: &str,
        changes: &StagedChanges,
    ) -> RepositoryResult<bool>;

    /// Force `status = failed`, bypassing staged changes.
    ///
    /// Same `source_key` condition as [`apply_changes`](MediaRepository::apply_changes).
    async fn mark_failed(&self, id: i64, source_key: &str) -> RepositoryResult<bool>;

    /// Records attached to `owner`, oldest first.
    async fn list_by_owner(&self, owner: &OwnerRef) -> RepositoryResult<Vec<MediaRecord>>;
}
