use mediafiles_core::constants::{DEFAULT_PREVIEW_CRF, DEFAULT_PREVIEW_PRESET, DEFAULT_PREVIEW_SIZE};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{ProcessingError, ProcessingResult};

/// Highest CRF accepted by libx264 for 8-bit output
const MAX_CRF: u8 = 51;

/// libx264 speed/compression presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl EncoderPreset {
    pub const ALL: [EncoderPreset; 9] = [
        EncoderPreset::Ultrafast,
        EncoderPreset::Superfast,
        EncoderPreset::Veryfast,
        EncoderPreset::Faster,
        EncoderPreset::Fast,
        EncoderPreset::Medium,
        EncoderPreset::Slow,
        EncoderPreset::Slower,
        EncoderPreset::Veryslow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncoderPreset::Ultrafast => "ultrafast",
            EncoderPreset::Superfast => "superfast",
            EncoderPreset::Veryfast => "veryfast",
            EncoderPreset::Faster => "faster",
            EncoderPreset::Fast => "fast",
            EncoderPreset::Medium => "medium",
            EncoderPreset::Slow => "slow",
            EncoderPreset::Slower => "slower",
            EncoderPreset::Veryslow => "veryslow",
        }
    }
}

impl Display for EncoderPreset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncoderPreset {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EncoderPreset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = EncoderPreset::ALL.iter().map(|p| p.as_str()).collect();
                ProcessingError::Configuration(format!(
                    "Invalid preset {}. Valid values: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Reject executable paths that could smuggle shell syntax or escape upwards.
pub fn validate_executable_path(name: &str, path: &str) -> ProcessingResult<()> {
    if path.is_empty() {
        return Err(ProcessingError::Configuration(format!(
            "{} path must not be empty",
            name
        )));
    }

    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(ProcessingError::Configuration(format!(
            "Invalid {} path: contains dangerous characters",
            name
        )));
    }

    if path.contains("..") {
        return Err(ProcessingError::Configuration(format!(
            "Invalid {} path: contains directory traversal",
            name
        )));
    }

    if !path
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '/' | '-' | '_' | '.' | '\\'))
    {
        return Err(ProcessingError::Configuration(format!(
            "Invalid {} path: contains unsafe characters",
            name
        )));
    }

    Ok(())
}

/// Validated video processor settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    preview_size: (u32, u32),
    crf: u8,
    preset: EncoderPreset,
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            preview_size: (DEFAULT_PREVIEW_SIZE[0], DEFAULT_PREVIEW_SIZE[1]),
            crf: DEFAULT_PREVIEW_CRF,
            preset: EncoderPreset::Fast,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl VideoOptions {
    pub fn new(
        preview_size: &[u32],
        crf: u8,
        preset: &str,
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
    ) -> ProcessingResult<Self> {
        let preview_size = match preview_size {
            [width, height] if *width > 0 && *height > 0 => (*width, *height),
            _ => {
                return Err(ProcessingError::Configuration(format!(
                    "preview_size must be two positive integers, got {:?}",
                    preview_size
                )))
            }
        };

        if crf > MAX_CRF {
            return Err(ProcessingError::Configuration(format!(
                "crf must be between 0 and {}, got {}",
                MAX_CRF, crf
            )));
        }

        let preset = if preset.is_empty() {
            DEFAULT_PREVIEW_PRESET.parse()?
        } else {
            preset.parse()?
        };

        let ffmpeg_path = ffmpeg_path.into();
        let ffprobe_path = ffprobe_path.into();
        validate_executable_path("ffmpeg", &ffmpeg_path)?;
        validate_executable_path("ffprobe", &ffprobe_path)?;

        Ok(Self {
            preview_size,
            crf,
            preset,
            ffmpeg_path,
            ffprobe_path,
        })
    }

    pub fn preview_size(&self) -> (u32, u32) {
        self.preview_size
    }

    pub fn crf(&self) -> u8 {
        self.crf
    }

    pub fn preset(&self) -> EncoderPreset {
        self.preset
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &str {
        &self.ffprobe_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_defaults() {
        let options =
            VideoOptions::new(&[854, 480], 28, "fast", "ffmpeg", "/usr/bin/ffprobe").unwrap();
        assert_eq!(options.preview_size(), (854, 480));
        assert_eq!(options.preset(), EncoderPreset::Fast);
        assert_eq!(
            options,
            VideoOptions {
                ffprobe_path: "/usr/bin/ffprobe".to_string(),
                ..VideoOptions::default()
            }
        );
    }

    #[test]
    fn every_preset_parses() {
        for preset in EncoderPreset::ALL {
            assert_eq!(preset.as_str().parse::<EncoderPreset>().unwrap(), preset);
        }
        assert!("placebo".parse::<EncoderPreset>().unwrap_err().is_configuration());
        assert!("Fast".parse::<EncoderPreset>().is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(VideoOptions::new(&[854, 480], 52, "fast", "ffmpeg", "ffprobe").is_err());
        assert!(VideoOptions::new(&[854, 480], 51, "fast", "ffmpeg", "ffprobe").is_ok());
        assert!(VideoOptions::new(&[854], 28, "fast", "ffmpeg", "ffprobe").is_err());
        assert!(VideoOptions::new(&[0, 480], 28, "fast", "ffmpeg", "ffprobe").is_err());
        assert!(VideoOptions::new(&[854, 480], 28, "turbo", "ffmpeg", "ffprobe").is_err());
    }

    #[test]
    fn rejects_unsafe_executables() {
        assert!(validate_executable_path("ffmpeg", "ffmpeg; rm -rf /").is_err());
        assert!(validate_executable_path("ffmpeg", "../bin/ffmpeg").is_err());
        assert!(validate_executable_path("ffmpeg", "/opt/ff mpeg").is_err());
        assert!(validate_executable_path("ffmpeg", "").is_err());
        assert!(validate_executable_path("ffmpeg", "/usr/local/bin/ffmpeg-6.1").is_ok());
    }
}
