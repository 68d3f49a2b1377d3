//! Image processor - resize, optimise and thumbnail

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use mediafiles_core::{DerivedField, FieldChange, MediaRecord};
use mediafiles_db::MediaRepository;
use mediafiles_storage::keys::{thumbnail_key, upload_key};
use mediafiles_storage::ArtifactStore;
use std::io::Cursor;
use std::sync::Arc;

use super::options::ImageOptions;
use crate::base::ProcessorBase;
use crate::error::{ProcessingError, ProcessingResult};
use crate::file::FileProcessor;
use crate::mime::MimeSniffer;
use crate::traits::MediaProcessor;

/// Dimensions that fit `(width, height)` inside `(max_width, max_height)`
/// keeping the aspect ratio. `None` when it already fits.
pub fn scaled_to_fit(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width <= max_width && height <= max_height {
        return None;
    }

    let factor = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scale = |side: u32| ((side as f64 * factor).round() as u32).max(1);
    Some((scale(width), scale(height)))
}

/// Output of the blocking render step
struct RenderedImage {
    width: u32,
    height: u32,
    primary: Vec<u8>,
    thumbnail: Vec<u8>,
    format: ImageFormat,
}

fn encode(
    img: &DynamicImage,
    format: ImageFormat,
    quality: u8,
    artifact: &str,
) -> ProcessingResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            // JPEG has no alpha channel
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        ImageFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilter::Adaptive,
            );
            img.write_with_encoder(encoder)
        }
        other => img.write_to(&mut Cursor::new(&mut buffer), other),
    };

    result.map_err(|e| ProcessingError::Encode {
        artifact: artifact.to_string(),
        message: e.to_string(),
    })?;
    Ok(buffer)
}

fn render(data: &[u8], options: &ImageOptions) -> ProcessingResult<RenderedImage> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessingError::Decode("unrecognised image format".to_string()))?;
    let mut img = reader
        .decode()
        .map_err(|e| ProcessingError::Decode(e.to_string()))?;

    if let Some(max_size) = options.max_size() {
        let (width, height) = img.dimensions();
        if let Some((w, h)) = scaled_to_fit(width, height, max_size, max_size) {
            img = img.resize_exact(w, h, FilterType::Lanczos3);
        }
    }

    let (width, height) = img.dimensions();
    let primary = encode(&img, format, options.quality(), "image")?;

    let (thumb_width, thumb_height) = options.thumbnail_size();
    let thumbnail = match scaled_to_fit(width, height, thumb_width, thumb_height) {
        Some((w, h)) => {
            let resized = img.resize_exact(w, h, FilterType::Lanczos3);
            encode(&resized, format, options.quality(), "thumbnail")?
        }
        None => encode(&img, format, options.quality(), "thumbnail")?,
    };

    Ok(RenderedImage {
        width,
        height,
        primary,
        thumbnail,
        format,
    })
}

pub struct ImageProcessor {
    file: FileProcessor,
    options: ImageOptions,
}

impl ImageProcessor {
    pub fn new(
        record: MediaRecord,
        store: Arc<dyn ArtifactStore>,
        repository: Arc<dyn MediaRepository>,
        sniffer: MimeSniffer,
        options: ImageOptions,
    ) -> Self {
        Self {
            file: FileProcessor::new(record, store, repository, sniffer),
            options,
        }
    }

    pub fn options(&self) -> &ImageOptions {
        &self.options
    }

    async fn run(&mut self) -> ProcessingResult<()> {
        self.file.detect_mime_type().await?;

        let start = std::time::Instant::now();
        let data = self.file.base_mut().load_source_once().await?;
        let options = self.options.clone();
        let rendered = tokio::task::spawn_blocking(move || render(&data, &options))
            .await
            .map_err(|e| ProcessingError::Task(e.to_string()))??;

        let base = self.file.base_mut();
        let original = base.source_key().to_string();
        let variant = base.record().variant();

        base.stage_field_change(FieldChange::Width(rendered.width));
        base.stage_field_change(FieldChange::Height(rendered.height));

        let primary_size = rendered.primary.len();
        let thumbnail_size = rendered.thumbnail.len();
        base.stage_artifact(
            DerivedField::StorageKey,
            Bytes::from(rendered.primary),
            &upload_key(variant, &original),
        )
        .await?;
        base.stage_artifact(
            DerivedField::ThumbnailKey,
            Bytes::from(rendered.thumbnail),
            &thumbnail_key(&original),
        )
        .await?;

        tracing::info!(
            file_id = base.record().id,
            format = ?rendered.format,
            width = rendered.width,
            height = rendered.height,
            primary_bytes = primary_size,
            thumbnail_bytes = thumbnail_size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image processed"
        );
        Ok(())
    }
}

#[async_trait]
impl MediaProcessor for ImageProcessor {
    fn base(&self) -> &ProcessorBase {
        self.file.base()
    }

    fn base_mut(&mut self) -> &mut ProcessorBase {
        self.file.base_mut()
    }

    fn name(&self) -> &'static str {
        "image"
    }

    async fn process(&mut self) -> ProcessingResult<()> {
        if let Err(e) = self.run().await {
            self.file.base_mut().mark_failed();
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::CommitOutcome;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use mediafiles_core::{ImageAttributes, MediaKind, NewMediaRecord, ProcessingStatus};
    use mediafiles_db::InMemoryMediaRepository;
    use mediafiles_storage::InMemoryStorage;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)
            .unwrap();
        buffer
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 200]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png).unwrap();
        buffer
    }

    fn dimensions_of(data: &[u8]) -> (u32, u32, ImageFormat) {
        let reader = ImageReader::new(Cursor::new(data)).with_guessed_format().unwrap();
        let format = reader.format().unwrap();
        let (width, height) = reader.decode().unwrap().dimensions();
        (width, height, format)
    }

    async fn setup(
        key: &str,
        data: Vec<u8>,
        options: ImageOptions,
    ) -> (ImageProcessor, InMemoryMediaRepository, InMemoryStorage) {
        let store = InMemoryStorage::new();
        store.insert(key, data).await.unwrap();
        let repo = InMemoryMediaRepository::new();
        let record = repo
            .insert(NewMediaRecord::new(key, MediaKind::Image(ImageAttributes::default())))
            .await
            .unwrap();
        repo.claim_for_processing(record.id, &record.storage_key).await.unwrap();

        let processor = ImageProcessor::new(
            record,
            Arc::new(store.clone()),
            Arc::new(repo.clone()),
            MimeSniffer::default(),
            options,
        );
        (processor, repo, store)
    }

    #[test]
    fn scaled_to_fit_keeps_aspect_ratio() {
        assert_eq!(scaled_to_fit(800, 600, 600, 600), Some((600, 450)));
        assert_eq!(scaled_to_fit(600, 800, 300, 300), Some((225, 300)));
        assert_eq!(scaled_to_fit(100, 50, 300, 300), None);
        assert_eq!(scaled_to_fit(1000, 1, 10, 10), Some((10, 1)));
    }

    #[tokio::test]
    async fn large_jpeg_is_resized_and_thumbnailed() {
        let options = ImageOptions::new(Some(600), 85, &[300, 300]).unwrap();
        let (mut processor, repo, store) = setup("imagefile/photo.jpg", jpeg(800, 600), options).await;

        processor.process().await.unwrap();
        assert_eq!(processor.commit().await.unwrap(), CommitOutcome::Committed);

        let stored = repo.get(processor.record().id).await.unwrap().unwrap();
        let attrs = stored.image().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Success);
        assert_eq!(stored.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!((attrs.width, attrs.height), (Some(600), Some(450)));
        assert_ne!(stored.storage_key, "imagefile/photo.jpg");
        assert!(stored.storage_key.starts_with("imagefile/"));
        assert!(stored.storage_key.ends_with(".jpg"));
        assert_eq!(attrs.thumbnail_key.as_deref(), Some("thumb_imagefile/photo.jpg"));

        let primary = store.read_all(&stored.storage_key).await.unwrap();
        assert_eq!(dimensions_of(&primary), (600, 450, ImageFormat::Jpeg));

        let thumb = store.read_all("thumb_imagefile/photo.jpg").await.unwrap();
        assert_eq!(dimensions_of(&thumb), (300, 225, ImageFormat::Jpeg));
    }

    #[tokio::test]
    async fn png_stays_png_and_small_thumbnail_is_not_upscaled() {
        let options = ImageOptions::new(None, 90, &[300]).unwrap();
        let (mut processor, repo, store) = setup("imagefile/icon.png", png(64, 32), options).await;

        processor.process().await.unwrap();
        processor.commit().await.unwrap();

        let stored = repo.get(processor.record().id).await.unwrap().unwrap();
        let attrs = stored.image().unwrap();
        assert_eq!((attrs.width, attrs.height), (Some(64), Some(32)));
        assert!(stored.storage_key.ends_with(".png"));

        let primary = store.read_all(&stored.storage_key).await.unwrap();
        assert_eq!(dimensions_of(&primary), (64, 32, ImageFormat::Png));
        let thumb = store.read_all(attrs.thumbnail_key.as_deref().unwrap()).await.unwrap();
        assert_eq!(dimensions_of(&thumb), (64, 32, ImageFormat::Png));
    }

    #[tokio::test]
    async fn same_source_processed_twice_yields_same_fields() {
        let source = jpeg(800, 600);
        let options = ImageOptions::new(Some(600), 85, &[300, 300]).unwrap();
        let (mut first, repo, store) = setup("imagefile/a.jpg", source.clone(), options.clone()).await;
        first.process().await.unwrap();
        first.commit().await.unwrap();

        store.insert("imagefile/b.jpg", source).await.unwrap();
        let record = repo
            .insert(NewMediaRecord::new(
                "imagefile/b.jpg",
                MediaKind::Image(ImageAttributes::default()),
            ))
            .await
            .unwrap();
        assert!(repo.claim_for_processing(record.id, &record.storage_key).await.unwrap());
        let mut second = ImageProcessor::new(
            record,
            Arc::new(store.clone()),
            Arc::new(repo.clone()),
            MimeSniffer::default(),
            options,
        );
        second.process().await.unwrap();
        second.commit().await.unwrap();

        let a = repo.get(first.record().id).await.unwrap().unwrap();
        let b = repo.get(second.record().id).await.unwrap().unwrap();
        let (a_attrs, b_attrs) = (a.image().unwrap(), b.image().unwrap());
        assert_eq!(a.status, ProcessingStatus::Success);
        assert_eq!(b.status, ProcessingStatus::Success);
        assert_eq!(a.mime_type, b.mime_type);
        assert_eq!((a_attrs.width, a_attrs.height), (b_attrs.width, b_attrs.height));
        assert_eq!((b_attrs.width, b_attrs.height), (Some(600), Some(450)));
        for thumb in [&a_attrs.thumbnail_key, &b_attrs.thumbnail_key] {
            assert!(thumb.as_deref().unwrap().starts_with("thumb_"));
        }
    }

    #[tokio::test]
    async fn undecodable_image_is_decode_error() {
        let (mut processor, repo, _store) =
            setup("imagefile/fake.png", b"not an image at all".to_vec(), ImageOptions::default()).await;

        let err = processor.process().await.unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));

        let stored = repo.get(processor.record().id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Processing);
        assert!(stored.image().unwrap().thumbnail_key.is_none());
    }
}
