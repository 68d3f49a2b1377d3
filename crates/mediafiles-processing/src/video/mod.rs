//! Video processing using FFmpeg
//!
//! Probes duration and dimensions with ffprobe and renders a short preview
//! clip assembled from evenly spaced segments of the source.

mod options;
mod preview;
mod probe;
mod processor;

pub use options::{validate_executable_path, EncoderPreset, VideoOptions};
pub use preview::{preview_segments, PreviewSegment};
pub use probe::{probe_video, VideoMetadata};
pub use processor::VideoProcessor;
