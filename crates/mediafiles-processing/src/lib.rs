//! Mediafiles Processing Library
//!
//! Per-variant processors that turn a stored upload into derived fields and
//! artifacts: MIME detection for every file, resizing/compression/thumbnails
//! for images, probing and preview clips for videos.

pub mod base;
pub mod error;
pub mod file;
pub mod mime;
pub mod registry;
pub mod traits;
pub mod validator;

#[cfg(feature = "image")]
pub mod image;

#[cfg(feature = "video")]
pub mod video;

// Re-export commonly used types
pub use base::{CommitOutcome, ProcessorBase, ProcessorStage, ScratchFiles};
pub use error::{ProcessingError, ProcessingResult};
pub use file::FileProcessor;
pub use mime::MimeSniffer;
pub use registry::{ProcessingSettings, ProcessorContext, ProcessorFactory, ProcessorRegistry};
pub use traits::MediaProcessor;
pub use validator::{MimeTypeValidator, ValidationError};

#[cfg(feature = "image")]
pub use crate::image::{ImageOptions, ImageProcessor};

#[cfg(feature = "video")]
pub use crate::video::{preview_segments, EncoderPreset, PreviewSegment, VideoOptions, VideoProcessor};
