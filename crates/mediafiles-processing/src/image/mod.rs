//! Image processing: resize to a maximum size, re-encode, thumbnail

mod options;
mod processor;

pub use options::ImageOptions;
pub use processor::{scaled_to_fit, ImageProcessor};
