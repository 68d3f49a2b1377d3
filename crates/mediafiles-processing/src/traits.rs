use async_trait::async_trait;
use mediafiles_core::MediaRecord;

use crate::base::{CommitOutcome, ProcessorBase};
use crate::error::ProcessingResult;

/// A processor bound to one media record.
///
/// `process` only stages changes; nothing reaches persistence before `commit`.
#[async_trait]
pub trait MediaProcessor: Send {
    fn base(&self) -> &ProcessorBase;

    fn base_mut(&mut self) -> &mut ProcessorBase;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn process(&mut self) -> ProcessingResult<()>;

    async fn commit(&mut self) -> ProcessingResult<CommitOutcome> {
        self.base_mut().commit().await
    }

    fn record(&self) -> &MediaRecord {
        self.base().record()
    }
}
