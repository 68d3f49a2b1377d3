use async_trait::async_trait;
use mediafiles_core::{FieldChange, MediaRecord};
use mediafiles_db::MediaRepository;
use mediafiles_storage::ArtifactStore;
use std::sync::Arc;

use crate::base::ProcessorBase;
use crate::error::ProcessingResult;
use crate::mime::MimeSniffer;
use crate::traits::MediaProcessor;

/// Detects and stages the MIME type. Used as is for plain files and
/// documents, and as the first step of the image and video processors.
pub struct FileProcessor {
    base: ProcessorBase,
    sniffer: MimeSniffer,
}

impl FileProcessor {
    pub fn new(
        record: MediaRecord,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
        sniffer: MimeSniffer,
    ) -> Self {
        Self {
            base: ProcessorBase::new(record, store, repository),
            sniffer,
        }
    }

    /// Sniff the loaded source and stage `mime_type`. Returns the detected type.
    pub async fn detect_mime_type(&mut self) -> ProcessingResult<String> {
        self.base.load_source_once().await?;
        self.base.reset_read_position();

        let sniffer = self.sniffer;
        let reader = self.base.source_reader().await?;
        let mime_type = sniffer.detect(reader)?;

        tracing::debug!(
            file_id = self.base.record().id,
            mime_type = %mime_type,
            "MIME type detected"
        );
        self.base
            .stage_field_change(FieldChange::MimeType(mime_type.clone()));
        Ok(mime_type)
    }
}

#[async_trait]
impl MediaProcessor for FileProcessor {
    fn base(&self) -> &ProcessorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ProcessorBase {
        &mut self.base
    }

    fn name(&self) -> &'static str {
        "file"
    }

    async fn process(&mut self) -> ProcessingResult<()> {
        if let Err(e) = self.detect_mime_type().await {
            self.base.mark_failed();
            return Err(e);
        }
        Ok(())
    }
}
