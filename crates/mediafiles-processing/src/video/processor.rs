//! Video processor - probe metadata and render a preview clip

use async_trait::async_trait;
use bytes::Bytes;
use mediafiles_core::{DerivedField, FieldChange, MediaRecord};
use mediafiles_db::MediaRepository;
use mediafiles_storage::keys::{preview_key, split_extension};
use mediafiles_storage::ArtifactStore;
use std::sync::Arc;

use super::options::VideoOptions;
use super::preview::{preview_segments, render_preview};
use super::probe::probe_video;
use crate::base::ProcessorBase;
use crate::error::ProcessingResult;
use crate::file::FileProcessor;
use crate::mime::MimeSniffer;
use crate::traits::MediaProcessor;

pub struct VideoProcessor {
    file: FileProcessor,
    options: VideoOptions,
}

impl VideoProcessor {
    pub fn new(
        record: MediaRecord,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
        sniffer: MimeSniffer,
        options: VideoOptions,
    ) -> Self {
        Self {
            file: FileProcessor::new(record, store, repository, sniffer),
            options,
        }
    }

    pub fn options(&self) -> &VideoOptions {
        &self.options
    }

    async fn run(&mut self) -> ProcessingResult<()> {
        self.file.detect_mime_type().await?;

        let start = std::time::Instant::now();
        let base = self.file.base_mut();
        let data = base.load_source_once().await?;
        let original = base.source_key().to_string();

        let (_, ext) = split_extension(&original);
        let input_suffix = if ext.is_empty() { ".video" } else { ext };
        let input = base.allocate_temp_file(input_suffix, Some(&data[..])).await?;
        let output = base.allocate_temp_file(".preview.mp4", None).await?;

        let metadata = probe_video(self.options.ffprobe_path(), &input).await?;
        let segments = preview_segments(metadata.duration)?;
        render_preview(&self.options, &input, &output, &segments).await?;
        let preview = tokio::fs::read(&output).await?;

        let base = self.file.base_mut();
        base.stage_field_change(FieldChange::Duration(metadata.duration));
        base.stage_field_change(FieldChange::Width(metadata.width));
        base.stage_field_change(FieldChange::Height(metadata.height));

        let preview_size = preview.len();
        base.stage_artifact(
            DerivedField::PreviewKey,
            Bytes::from(preview),
            &preview_key(&original),
        )
        .await?;

        tracing::info!(
            file_id = base.record().id,
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            segment_count = segments.len(),
            preview_bytes = preview_size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video processed"
        );
        Ok(())
    }
}

#[async_trait]
impl MediaProcessor for VideoProcessor {
    fn base(&self) -> &ProcessorBase {
        self.file.base()
    }

    fn base_mut(&mut self) -> &mut ProcessorBase {
        self.file.base_mut()
    }

    fn name(&self) -> &'static str {
        "video"
    }

    async fn process(&mut self) -> ProcessingResult<()> {
        let result = self.run().await;
        if result.is_err() {
            self.file.base_mut().mark_failed();
            self.file.base_mut().release_temp_files();
        }
        result
    }
}
