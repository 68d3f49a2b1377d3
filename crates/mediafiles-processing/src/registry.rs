//! Variant to processor lookup

use mediafiles_core::{Config, MediaRecord, MediaVariant, ProcessorParams};
use mediafiles_db::MediaRepository;
use mediafiles_storage::ArtifactStore;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ProcessingError, ProcessingResult};
use crate::file::FileProcessor;
use crate::mime::MimeSniffer;
use crate::traits::MediaProcessor;

#[cfg(feature = "image")]
use crate::image::{ImageOptions, ImageProcessor};
#[cfg(feature = "video")]
use crate::video::{VideoOptions, VideoProcessor};

/// Process-wide settings shared by every processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSettings {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub mime_sample_bytes: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            mime_sample_bytes: mediafiles_core::constants::MIME_SAMPLE_BYTES,
        }
    }
}

impl ProcessingSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            mime_sample_bytes: config.mime_sample_bytes,
        }
    }

    pub fn sniffer(&self) -> MimeSniffer {
        MimeSniffer::new(self.mime_sample_bytes)
    }
}

/// Everything a factory needs to bind a processor to one record
pub struct ProcessorContext {
    pub record: MediaRecord,
    pub store: Arc<dyn ArtifactStore>,
    pub repository: Arc<dyn MediaRepository>,
}

/// Builds processors for one variant
pub trait ProcessorFactory: Send + Sync {
    /// Check `params` without any I/O. Fails with a configuration error.
    fn validate(
        &self,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<()>;

    fn build(
        &self,
        context: ProcessorContext,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<Box<dyn MediaProcessor>>;
}

fn params_mismatch(expected: &str, params: &ProcessorParams) -> ProcessingError {
    ProcessingError::Configuration(format!("{} processor cannot take {:?}", expected, params))
}

struct FileFactory;

impl ProcessorFactory for FileFactory {
    fn validate(
        &self,
        params: &ProcessorParams,
        _settings: &ProcessingSettings,
    ) -> ProcessingResult<()> {
        match params {
            ProcessorParams::File => Ok(()),
            other => Err(params_mismatch("file", other)),
        }
    }

    fn build(
        &self,
        context: ProcessorContext,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<Box<dyn MediaProcessor>> {
        self.validate(params, settings)?;
        Ok(Box::new(FileProcessor::new(
            context.record,
            context.store,
            context.repository,
            settings.sniffer(),
        )))
    }
}

#[cfg(feature = "image")]
struct ImageFactory;

#[cfg(feature = "image")]
impl ImageFactory {
    fn options(params: &ProcessorParams) -> ProcessingResult<ImageOptions> {
        match params {
            ProcessorParams::Image {
                max_size,
                quality,
                thumbnail_size,
            } => ImageOptions::new(*max_size, *quality, thumbnail_size),
            other => Err(params_mismatch("image", other)),
        }
    }
}

#[cfg(feature = "image")]
impl ProcessorFactory for ImageFactory {
    fn validate(
        &self,
        params: &ProcessorParams,
        _settings: &ProcessingSettings,
    ) -> ProcessingResult<()> {
        Self::options(params).map(|_| ())
    }

    fn build(
        &self,
        context: ProcessorContext,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<Box<dyn MediaProcessor>> {
        let options = Self::options(params)?;
        Ok(Box::new(ImageProcessor::new(
            context.record,
            context.store,
            context.repository,
            settings.sniffer(),
            options,
        )))
    }
}

#[cfg(feature = "video")]
struct VideoFactory;

#[cfg(feature = "video")]
impl VideoFactory {
    fn options(
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<VideoOptions> {
        match params {
            ProcessorParams::Video {
                preview_size,
                crf,
                preset,
            } => VideoOptions::new(
                preview_size,
                *crf,
                preset,
                settings.ffmpeg_path.clone(),
                settings.ffprobe_path.clone(),
            ),
            other => Err(params_mismatch("video", other)),
        }
    }
}

#[cfg(feature = "video")]
impl ProcessorFactory for VideoFactory {
    fn validate(
        &self,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<()> {
        Self::options(params, settings).map(|_| ())
    }

    fn build(
        &self,
        context: ProcessorContext,
        params: &ProcessorParams,
        settings: &ProcessingSettings,
    ) -> ProcessingResult<Box<dyn MediaProcessor>> {
        let options = Self::options(params, settings)?;
        Ok(Box::new(VideoProcessor::new(
            context.record,
            context.store,
            context.repository,
            settings.sniffer(),
            options,
        )))
    }
}

/// Maps each media variant to the factory of its processor.
#[derive(Clone)]
pub struct ProcessorRegistry {
    settings: ProcessingSettings,
    factories: HashMap<MediaVariant, Arc<dyn ProcessorFactory>>,
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new(ProcessingSettings::default())
    }
}

impl ProcessorRegistry {
    /// Registry with the built-in processors for every compiled-in variant.
    pub fn new(settings: ProcessingSettings) -> Self {
        let mut registry = Self::empty(settings);
        registry.register(MediaVariant::File, Arc::new(FileFactory));
        registry.register(MediaVariant::Document, Arc::new(FileFactory));
        #[cfg(feature = "image")]
        registry.register(MediaVariant::Image, Arc::new(ImageFactory));
        #[cfg(feature = "video")]
        registry.register(MediaVariant::Video, Arc::new(VideoFactory));
        registry
    }

    pub fn empty(settings: ProcessingSettings) -> Self {
        Self {
            settings,
            factories: HashMap::new(),
        }
    }

    /// Register or replace the factory for `variant`.
    pub fn register(&mut self, variant: MediaVariant, factory: Arc<dyn ProcessorFactory>) {
        self.factories.insert(variant, factory);
    }

    pub fn settings(&self) -> &ProcessingSettings {
        &self.settings
    }

    pub fn contains(&self, variant: MediaVariant) -> bool {
        self.factories.contains_key(&variant)
    }

    fn factory(&self, variant: MediaVariant) -> ProcessingResult<&Arc<dyn ProcessorFactory>> {
        self.factories.get(&variant).ok_or_else(|| {
            ProcessingError::Configuration(format!("No processor registered for {}", variant))
        })
    }

    /// Validate parameters for `variant` without building anything.
    pub fn validate_params(
        &self,
        variant: MediaVariant,
        params: &ProcessorParams,
    ) -> ProcessingResult<()> {
        self.factory(variant)?.validate(params, &self.settings)
    }

    /// Bind a fresh processor to `record`.
    pub fn build(
        &self,
        record: MediaRecord,
        params: &ProcessorParams,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
    ) -> ProcessingResult<Box<dyn MediaProcessor>> {
        let factory = self.factory(record.variant())?;
        factory.build(
            ProcessorContext {
                record,
                store,
                repository,
            },
            params,
            &self.settings,
        )
    }
}
