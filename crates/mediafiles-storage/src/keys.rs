//! Shared key generation for storage backends.

use crate::traits::{StorageError, StorageResult};
use mediafiles_core::constants::{PREVIEW_PREFIX, THUMBNAIL_PREFIX};
use mediafiles_core::MediaVariant;
use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

const ALTERNATIVE_SUFFIX_LEN: usize = 7;

/// Reject keys that could escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}

/// Split the last path component of `name` into `(prefix_and_stem, extension)`.
///
/// The extension includes its leading dot. A leading dot on the file name
/// (e.g. `.env`) does not start an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[base_start..].rfind('.') {
        Some(dot) if dot > 0 => name.split_at(base_start + dot),
        _ => (name, ""),
    }
}

/// Lower-case the extension of `name`, leaving everything else untouched.
pub fn normalize_name(name: &str) -> StorageResult<String> {
    validate_key(name)?;
    let (stem, ext) = split_extension(name);
    if stem.is_empty() || stem.ends_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key has no file name: {}",
            name
        )));
    }
    Ok(format!("{}{}", stem, ext.to_lowercase()))
}

/// `{stem}_{random}{ext}`, used when the preferred key is taken.
pub fn alternative_name(name: &str) -> String {
    let (stem, ext) = split_extension(name);
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ALTERNATIVE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}_{}{}", stem, suffix, ext)
}

/// Reduce an uploaded file name to a safe base name.
///
/// Strips directories, turns spaces into underscores and drops anything that
/// is not alphanumeric, `-`, `_` or `.`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    base.chars()
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Key for a newly uploaded primary blob: `{variant}/{uuid}{ext}`.
pub fn upload_key(variant: MediaVariant, filename: &str) -> String {
    let safe = sanitize_filename(filename);
    let (_, ext) = split_extension(&safe);
    format!("{}/{}{}", variant.tag(), Uuid::new_v4(), ext.to_lowercase())
}

/// Thumbnail name for a primary key.
pub fn thumbnail_key(original: &str) -> String {
    format!("{}{}", THUMBNAIL_PREFIX, original)
}

/// Preview name for a primary key.
pub fn preview_key(original: &str) -> String {
    format!("{}{}", PREVIEW_PREFIX, original)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_key_uses_variant_prefix_and_lowercase_extension() {
        let key = upload_key(MediaVariant::Image, "Holiday Photo.JPG");
        assert!(key.starts_with("imagefile/"));
        assert!(key.ends_with(".jpg"));
        // imagefile/ + 36 char uuid + .jpg
        assert_eq!(key.len(), "imagefile/".len() + 36 + 4);
    }

    #[test]
    fn upload_key_without_extension() {
        let key = upload_key(MediaVariant::File, "README");
        assert!(key.starts_with("file/"));
        assert!(!key.contains('.'));
    }

    #[test]
    fn upload_key_ignores_client_directories() {
        let key = upload_key(MediaVariant::Document, "../../etc/report.PDF");
        assert!(key.starts_with("documentfile/"));
        assert!(key.ends_with(".pdf"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn split_extension_handles_paths_and_dotfiles() {
        assert_eq!(split_extension("a/b.tar.GZ"), ("a/b.tar", ".GZ"));
        assert_eq!(split_extension("dir.v2/file"), ("dir.v2/file", ""));
        assert_eq!(split_extension(".env"), (".env", ""));
    }

    #[test]
    fn normalize_lowercases_extension_only() {
        assert_eq!(
            normalize_name("thumb_imagefile/ABC.PNG").unwrap(),
            "thumb_imagefile/ABC.png"
        );
        assert!(normalize_name("../x.png").is_err());
        assert!(normalize_name("/abs.png").is_err());
        assert!(normalize_name("dir/").is_err());
    }

    #[test]
    fn alternative_name_keeps_extension() {
        let alt = alternative_name("videofile/clip.mp4");
        assert!(alt.starts_with("videofile/clip_"));
        assert!(alt.ends_with(".mp4"));
        assert_eq!(alt.len(), "videofile/clip.mp4".len() + 1 + ALTERNATIVE_SUFFIX_LEN);
    }

    #[test]
    fn artifact_prefixes() {
        assert_eq!(thumbnail_key("imagefile/a.jpg"), "thumb_imagefile/a.jpg");
        assert_eq!(preview_key("videofile/a.mp4"), "preview_videofile/a.mp4");
    }

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize_filename("my file (1).png"), "my_file_1.png");
        assert_eq!(sanitize_filename("C:\\Users\\x\\pic.gif"), "pic.gif");
    }
}
