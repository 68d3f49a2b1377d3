use mediafiles_core::constants::{
    DEFAULT_COMPRESSION_QUALITY, DEFAULT_PREVIEW_CRF, DEFAULT_PREVIEW_PRESET,
};
use mediafiles_core::{ImageAttributes, MediaKind, MediaVariant, VideoAttributes};

/// Processing knobs accepted on the command line
#[derive(Debug, Clone, Default)]
pub struct KindOptions {
    pub max_size: Option<u32>,
    pub quality: Option<u8>,
    pub thumbnail_size: Option<Vec<u32>>,
    pub preview_size: Option<Vec<u32>>,
    pub crf: Option<u8>,
    pub preset: Option<String>,
}

/// Parse `W` or `W,H` (also `WxH`).
pub fn parse_size(s: &str) -> Result<Vec<u32>, String> {
    let parts: Vec<&str> = s.split([',', 'x']).map(str::trim).collect();
    if parts.is_empty() || parts.len() > 2 {
        return Err(format!("expected W or W,H, got '{}'", s));
    }
    parts
        .iter()
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| format!("'{}' is not a positive integer", p))
        })
        .collect()
}

/// Build the record payload for `variant`. Options that do not apply to the
/// variant are ignored.
pub fn build_kind(variant: MediaVariant, opts: KindOptions) -> MediaKind {
    match variant {
        MediaVariant::File => MediaKind::File,
        MediaVariant::Document => MediaKind::Document,
        MediaVariant::Image => {
            let defaults = ImageAttributes::default();
            MediaKind::Image(ImageAttributes {
                max_size: opts.max_size,
                compression_quality: opts.quality.unwrap_or(DEFAULT_COMPRESSION_QUALITY),
                thumbnail_size: opts.thumbnail_size.unwrap_or(defaults.thumbnail_size),
                ..ImageAttributes::default()
            })
        }
        MediaVariant::Video => {
            let defaults = VideoAttributes::default();
            MediaKind::Video(VideoAttributes {
                preview_size: opts.preview_size.unwrap_or(defaults.preview_size),
                crf: opts.crf.unwrap_or(DEFAULT_PREVIEW_CRF),
                preset: opts
                    .preset
                    .unwrap_or_else(|| DEFAULT_PREVIEW_PRESET.to_string()),
                ..VideoAttributes::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_forms() {
        assert_eq!(parse_size("300").unwrap(), vec![300]);
        assert_eq!(parse_size("640,480").unwrap(), vec![640, 480]);
        assert_eq!(parse_size("640x480").unwrap(), vec![640, 480]);
        assert!(parse_size("1,2,3").is_err());
        assert!(parse_size("-5").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn image_kind_uses_defaults_for_unset_options() {
        let kind = build_kind(
            MediaVariant::Image,
            KindOptions {
                max_size: Some(1024),
                ..KindOptions::default()
            },
        );
        let MediaKind::Image(attrs) = kind else {
            panic!("expected image payload");
        };
        assert_eq!(attrs.max_size, Some(1024));
        assert_eq!(attrs.compression_quality, DEFAULT_COMPRESSION_QUALITY);
        assert_eq!(attrs.thumbnail_size, vec![300, 300]);
    }

    #[test]
    fn video_options_ignored_for_documents() {
        let kind = build_kind(
            MediaVariant::Document,
            KindOptions {
                crf: Some(20),
                ..KindOptions::default()
            },
        );
        assert_eq!(kind, MediaKind::Document);
    }

    #[test]
    fn video_kind_carries_preview_settings() {
        let kind = build_kind(
            MediaVariant::Video,
            KindOptions {
                preview_size: Some(vec![640, 360]),
                preset: Some("veryfast".to_string()),
                ..KindOptions::default()
            },
        );
        let MediaKind::Video(attrs) = kind else {
            panic!("expected video payload");
        };
        assert_eq!(attrs.preview_size, vec![640, 360]);
        assert_eq!(attrs.crf, DEFAULT_PREVIEW_CRF);
        assert_eq!(attrs.preset, "veryfast");
    }
}
