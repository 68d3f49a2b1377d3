//! Application-wide constants

/// Default JPEG/WebP quality applied when an image record does not override it.
pub const DEFAULT_COMPRESSION_QUALITY: u8 = 85;

/// Default thumbnail bounding box (width, height).
pub const DEFAULT_THUMBNAIL_SIZE: [u32; 2] = [300, 300];

/// Default preview frame size (width, height).
pub const DEFAULT_PREVIEW_SIZE: [u32; 2] = [854, 480];

/// Default x264 constant rate factor for previews.
pub const DEFAULT_PREVIEW_CRF: u8 = 28;

/// Default x264 speed preset for previews.
pub const DEFAULT_PREVIEW_PRESET: &str = "fast";

/// Number of leading bytes inspected when sniffing a MIME type.
pub const MIME_SAMPLE_BYTES: usize = 2048;

/// Prefix prepended to the primary key when storing an image thumbnail.
pub const THUMBNAIL_PREFIX: &str = "thumb_";

/// Prefix prepended to the primary key when storing a video preview.
pub const PREVIEW_PREFIX: &str = "preview_";

/// Task name under which processing jobs are enqueued on the worker pool.
pub const FILE_PROCESSING_TASK: &str = "mediafiles.file-processing";
