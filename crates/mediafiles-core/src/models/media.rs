use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::changes::{FieldChange, StagedChanges};
use super::params::ProcessorParams;
use super::status::ProcessingStatus;
use crate::constants::{
    DEFAULT_COMPRESSION_QUALITY, DEFAULT_PREVIEW_CRF, DEFAULT_PREVIEW_PRESET,
    DEFAULT_PREVIEW_SIZE, DEFAULT_THUMBNAIL_SIZE,
};

/// Closed set of media record variants.
///
/// The tag doubles as the directory prefix of primary storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaVariant {
    File,
    Image,
    Video,
    Document,
}

impl MediaVariant {
    pub const ALL: [MediaVariant; 4] = [
        MediaVariant::File,
        MediaVariant::Image,
        MediaVariant::Video,
        MediaVariant::Document,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            MediaVariant::File => "file",
            MediaVariant::Image => "imagefile",
            MediaVariant::Video => "videofile",
            MediaVariant::Document => "documentfile",
        }
    }

    /// MIME patterns accepted on upload. An empty list accepts anything.
    pub fn allowed_mime_patterns(&self) -> &'static [&'static str] {
        match self {
            MediaVariant::File => &[],
            MediaVariant::Image => &["image/*"],
            MediaVariant::Video => &["video/*"],
            MediaVariant::Document => &["application/pdf", "text/plain"],
        }
    }
}

impl Display for MediaVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.tag())
    }
}

impl FromStr for MediaVariant {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(MediaVariant::File),
            "image" | "imagefile" => Ok(MediaVariant::Image),
            "video" | "videofile" => Ok(MediaVariant::Video),
            "document" | "documentfile" => Ok(MediaVariant::Document),
            _ => Err(anyhow::anyhow!("Invalid media variant: {}", s)),
        }
    }
}

/// Polymorphic back-reference to the entity a file is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: i64,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: i64) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id,
        }
    }
}

impl FromStr for OwnerRef {
    type Err = anyhow::Error;

    /// Parses `type:id`, e.g. `article:42`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (owner_type, owner_id) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Owner must be formatted as TYPE:ID, got {}", s))?;
        if owner_type.trim().is_empty() {
            return Err(anyhow::anyhow!("Owner type must not be empty"));
        }
        let owner_id = owner_id
            .trim()
            .parse::<i64>()
            .map_err(|_| anyhow::anyhow!("Owner id must be an integer, got {}", owner_id))?;
        Ok(OwnerRef::new(owner_type.trim(), owner_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageAttributes {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail_key: Option<String>,
    pub compression_quality: u8,
    pub thumbnail_size: Vec<u32>,
    /// Upper bound for the longer side. Lives only on the in-memory record.
    #[serde(skip)]
    pub max_size: Option<u32>,
}

impl Default for ImageAttributes {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            thumbnail_key: None,
            compression_quality: DEFAULT_COMPRESSION_QUALITY,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE.to_vec(),
            max_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoAttributes {
    /// Seconds
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub preview_key: Option<String>,
    // Preview tuning, never persisted
    #[serde(skip)]
    pub preview_size: Vec<u32>,
    #[serde(skip)]
    pub crf: u8,
    #[serde(skip)]
    pub preset: String,
}

impl Default for VideoAttributes {
    fn default() -> Self {
        Self {
            duration: None,
            width: None,
            height: None,
            preview_key: None,
            preview_size: DEFAULT_PREVIEW_SIZE.to_vec(),
            crf: DEFAULT_PREVIEW_CRF,
            preset: DEFAULT_PREVIEW_PRESET.to_string(),
        }
    }
}

/// Variant payload of a media record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum MediaKind {
    File,
    Image(ImageAttributes),
    Video(VideoAttributes),
    Document,
}

impl MediaKind {
    pub fn variant(&self) -> MediaVariant {
        match self {
            MediaKind::File => MediaVariant::File,
            MediaKind::Image(_) => MediaVariant::Image,
            MediaKind::Video(_) => MediaVariant::Video,
            MediaKind::Document => MediaVariant::Document,
        }
    }

    /// Default payload for a variant.
    pub fn for_variant(variant: MediaVariant) -> Self {
        match variant {
            MediaVariant::File => MediaKind::File,
            MediaVariant::Image => MediaKind::Image(ImageAttributes::default()),
            MediaVariant::Video => MediaKind::Video(VideoAttributes::default()),
            MediaVariant::Document => MediaKind::Document,
        }
    }

    /// Copies construction-time settings from `source` when both payloads are
    /// the same variant. Used to hand a freshly persisted record back to the
    /// caller without losing settings the store does not keep.
    pub fn carry_transient_from(&mut self, source: &MediaKind) {
        match (self, source) {
            (MediaKind::Image(dst), MediaKind::Image(src)) => dst.max_size = src.max_size,
            (MediaKind::Video(dst), MediaKind::Video(src)) => {
                dst.preview_size = src.preview_size.clone();
                dst.crf = src.crf;
                dst.preset = src.preset.clone();
            }
            _ => {}
        }
    }
}

/// Persistent media record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    pub storage_key: String,
    pub mime_type: Option<String>,
    pub status: ProcessingStatus,
    pub owner: Option<OwnerRef>,
    #[serde(flatten)]
    pub kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRecord {
    pub fn variant(&self) -> MediaVariant {
        self.kind.variant()
    }

    /// Whether the record points at a primary blob.
    pub fn has_source(&self) -> bool {
        !self.storage_key.trim().is_empty()
    }

    pub fn image(&self) -> Option<&ImageAttributes> {
        match &self.kind {
            MediaKind::Image(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn video(&self) -> Option<&VideoAttributes> {
        match &self.kind {
            MediaKind::Video(attrs) => Some(attrs),
            _ => None,
        }
    }

    /// Processor settings gathered from the record's own configuration.
    pub fn processor_params(&self) -> ProcessorParams {
        match &self.kind {
            MediaKind::File | MediaKind::Document => ProcessorParams::File,
            MediaKind::Image(attrs) => ProcessorParams::Image {
                max_size: attrs.max_size,
                quality: attrs.compression_quality,
                thumbnail_size: attrs.thumbnail_size.clone(),
            },
            MediaKind::Video(attrs) => ProcessorParams::Video {
                preview_size: attrs.preview_size.clone(),
                crf: attrs.crf,
                preset: attrs.preset.clone(),
            },
        }
    }

    /// Writes staged derived fields onto this record. Changes that do not
    /// apply to the record's variant are ignored.
    pub fn apply_changes(&mut self, changes: &StagedChanges) {
        for change in changes.iter() {
            match (change, &mut self.kind) {
                (FieldChange::MimeType(mime), _) => self.mime_type = Some(mime.clone()),
                (FieldChange::StorageKey(key), _) => self.storage_key = key.clone(),
                (FieldChange::Width(w), MediaKind::Image(attrs)) => attrs.width = Some(*w),
                (FieldChange::Height(h), MediaKind::Image(attrs)) => attrs.height = Some(*h),
                (FieldChange::ThumbnailKey(key), MediaKind::Image(attrs)) => {
                    attrs.thumbnail_key = Some(key.clone())
                }
                (FieldChange::Width(w), MediaKind::Video(attrs)) => attrs.width = Some(*w),
                (FieldChange::Height(h), MediaKind::Video(attrs)) => attrs.height = Some(*h),
                (FieldChange::Duration(d), MediaKind::Video(attrs)) => attrs.duration = Some(*d),
                (FieldChange::PreviewKey(key), MediaKind::Video(attrs)) => {
                    attrs.preview_key = Some(key.clone())
                }
                _ => {}
            }
        }
    }
}

/// Input for creating a media record
#[derive(Debug, Clone, PartialEq)]
pub struct NewMediaRecord {
    pub storage_key: String,
    pub owner: Option<OwnerRef>,
    pub kind: MediaKind,
}

impl NewMediaRecord {
    pub fn new(storage_key: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            storage_key: storage_key.into(),
            owner: None,
            kind,
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }
}
