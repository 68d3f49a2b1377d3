use mediafiles_core::constants::{DEFAULT_COMPRESSION_QUALITY, DEFAULT_THUMBNAIL_SIZE};

use crate::error::{ProcessingError, ProcessingResult};

/// Validated image processor settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    max_size: Option<u32>,
    quality: u8,
    thumbnail: (u32, u32),
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            quality: DEFAULT_COMPRESSION_QUALITY,
            thumbnail: (DEFAULT_THUMBNAIL_SIZE[0], DEFAULT_THUMBNAIL_SIZE[1]),
        }
    }
}

impl ImageOptions {
    /// `thumbnail_size` takes one value (square) or two (width, height).
    pub fn new(max_size: Option<u32>, quality: u8, thumbnail_size: &[u32]) -> ProcessingResult<Self> {
        if max_size == Some(0) {
            return Err(ProcessingError::Configuration(
                "max_size must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&quality) {
            return Err(ProcessingError::Configuration(format!(
                "quality must be between 1 and 100, got {}",
                quality
            )));
        }

        let thumbnail = match thumbnail_size {
            [side] => (*side, *side),
            [width, height] => (*width, *height),
            other => {
                return Err(ProcessingError::Configuration(format!(
                    "thumbnail_size takes one or two values, got {}",
                    other.len()
                )))
            }
        };
        if thumbnail.0 == 0 || thumbnail.1 == 0 {
            return Err(ProcessingError::Configuration(
                "thumbnail_size values must be positive".to_string(),
            ));
        }

        Ok(Self {
            max_size,
            quality,
            thumbnail,
        })
    }

    pub fn max_size(&self) -> Option<u32> {
        self.max_size
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn thumbnail_size(&self) -> (u32, u32) {
        self.thumbnail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_thumbnail_value_is_square() {
        let options = ImageOptions::new(None, 85, &[128]).unwrap();
        assert_eq!(options.thumbnail_size(), (128, 128));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ImageOptions::new(None, 0, &[300]).unwrap_err().is_configuration());
        assert!(ImageOptions::new(None, 101, &[300]).unwrap_err().is_configuration());
        assert!(ImageOptions::new(Some(0), 85, &[300]).unwrap_err().is_configuration());
        assert!(ImageOptions::new(None, 85, &[]).is_err());
        assert!(ImageOptions::new(None, 85, &[1, 2, 3]).is_err());
        assert!(ImageOptions::new(None, 85, &[300, 0]).is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(ImageOptions::new(Some(1), 1, &[1, 1]).is_ok());
        assert!(ImageOptions::new(None, 100, &[300, 200]).is_ok());
    }
}
