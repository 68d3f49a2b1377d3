//! PostgreSQL media repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediafiles_core::constants::{DEFAULT_COMPRESSION_QUALITY, DEFAULT_THUMBNAIL_SIZE};
use mediafiles_core::{
    FieldChange, ImageAttributes, MediaKind, MediaRecord, MediaVariant, NewMediaRecord, OwnerRef,
    ProcessingStatus, StagedChanges, VideoAttributes,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::MediaRepository;

const MEDIA_COLUMNS: &str = "id, variant, storage_key, mime_type, status, owner_type, owner_id, \
     width, height, thumbnail_key, compression_quality, thumbnail_size, duration_seconds, \
     preview_key, created_at, updated_at";

#[derive(Debug, FromRow)]
struct MediaRow {
    id: i64,
    variant: String,
    storage_key: String,
    mime_type: Option<String>,
    status: ProcessingStatus,
    owner_type: Option<String>,
    owner_id: Option<i64>,
    width: Option<i32>,
    height: Option<i32>,
    thumbnail_key: Option<String>,
    compression_quality: Option<i16>,
    thumbnail_size: Option<Vec<i32>>,
    duration_seconds: Option<f64>,
    preview_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MediaRow {
    fn into_record(self) -> RepositoryResult<MediaRecord> {
        let variant = self
            .variant
            .parse::<MediaVariant>()
            .map_err(|e| RepositoryError::InvalidRow {
                id: self.id,
                reason: e.to_string(),
            })?;

        let dimension = |v: Option<i32>| v.and_then(|v| u32::try_from(v).ok());

        let kind = match variant {
            MediaVariant::File => MediaKind::File,
            MediaVariant::Document => MediaKind::Document,
            MediaVariant::Image => MediaKind::Image(ImageAttributes {
                width: dimension(self.width),
                height: dimension(self.height),
                thumbnail_key: self.thumbnail_key,
                compression_quality: self
                    .compression_quality
                    .and_then(|q| u8::try_from(q).ok())
                    .unwrap_or(DEFAULT_COMPRESSION_QUALITY),
                thumbnail_size: self
                    .thumbnail_size
                    .map(|sizes| {
                        sizes
                            .into_iter()
                            .filter_map(|s| u32::try_from(s).ok())
                            .collect()
                    })
                    .unwrap_or_else(|| DEFAULT_THUMBNAIL_SIZE.to_vec()),
                max_size: None,
            }),
            MediaVariant::Video => MediaKind::Video(VideoAttributes {
                duration: self.duration_seconds,
                width: dimension(self.width),
                height: dimension(self.height),
                preview_key: self.preview_key,
                ..VideoAttributes::default()
            }),
        };

        let owner = match (self.owner_type, self.owner_id) {
            (Some(owner_type), Some(owner_id)) => Some(OwnerRef::new(owner_type, owner_id)),
            _ => None,
        };

        Ok(MediaRecord {
            id: self.id,
            storage_key: self.storage_key,
            mime_type: self.mime_type,
            status: self.status,
            owner,
            kind,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// User-editable image settings as column values
fn image_settings(kind: &MediaKind) -> (Option<i16>, Option<Vec<i32>>) {
    match kind {
        MediaKind::Image(attrs) => (
            Some(i16::from(attrs.compression_quality)),
            Some(
                attrs
                    .thumbnail_size
                    .iter()
                    .map(|s| i32::try_from(*s).unwrap_or(i32::MAX))
                    .collect(),
            ),
        ),
        _ => (None, None),
    }
}

fn to_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn map_write_error(e: sqlx::Error, storage_key: &str) -> RepositoryError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::DuplicateKey(storage_key.to_string())
        }
        _ => RepositoryError::Database(e),
    }
}

#[derive(Clone)]
pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self, new), fields(storage_key = %new.storage_key))]
    async fn insert(&self, new: NewMediaRecord) -> RepositoryResult<MediaRecord> {
        let (quality, thumbnail_size) = image_settings(&new.kind);
        let sql = format!(
            r#"
            INSERT INTO media_files
                (variant, storage_key, owner_type, owner_id, compression_quality, thumbnail_size)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, MediaRow>(&sql)
            .bind(new.kind.variant().tag())
            .bind(&new.storage_key)
            .bind(new.owner.as_ref().map(|o| o.owner_type.clone()))
            .bind(new.owner.as_ref().map(|o| o.owner_id))
            .bind(quality)
            .bind(thumbnail_size)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &new.storage_key))?;

        let mut record = row.into_record()?;
        record.kind.carry_transient_from(&new.kind);

        tracing::debug!(file_id = record.id, variant = %record.variant(), "Media record inserted");
        Ok(record)
    }

    #[tracing::instrument(skip(self, record), fields(file_id = record.id))]
    async fn save(&self, record: &MediaRecord) -> RepositoryResult<MediaRecord> {
        let (quality, thumbnail_size) = image_settings(&record.kind);
        let sql = format!(
            r#"
            UPDATE media_files
            SET status = CASE
                    WHEN storage_key <> $2 THEN 'pending'::processing_status
                    ELSE status
                END,
                storage_key = $2,
                owner_type = $3,
                owner_id = $4,
                compression_quality = $5,
                thumbnail_size = $6,
                updated_at = NOW()
            WHERE id = $1 AND variant = $7
            RETURNING {}
            "#,
            MEDIA_COLUMNS
        );

        let row = sqlx::query_as::<Postgres, MediaRow>(&sql)
            .bind(record.id)
            .bind(&record.storage_key)
            .bind(record.owner.as_ref().map(|o| o.owner_type.clone()))
            .bind(record.owner.as_ref().map(|o| o.owner_id))
            .bind(quality)
            .bind(thumbnail_size)
            .bind(record.variant().tag())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &record.storage_key))?;

        match row {
            Some(row) => {
                let mut saved = row.into_record()?;
                saved.kind.carry_transient_from(&record.kind);
                Ok(saved)
            }
            None => match self.get(record.id).await? {
                Some(existing) => Err(RepositoryError::VariantMismatch {
                    id: record.id,
                    from: existing.variant().to_string(),
                    to: record.variant().to_string(),
                }),
                None => Err(RepositoryError::NotFound(record.id)),
            },
        }
    }

    async fn get(&self, id: i64) -> RepositoryResult<Option<MediaRecord>> {
        let sql = format!("SELECT {} FROM media_files WHERE id = $1", MEDIA_COLUMNS);
        let row = sqlx::query_as::<Postgres, MediaRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(MediaRow::into_record).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_for_processing(&self, id: i64, source_key: &str) -> RepositoryResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(ProcessingStatus, String)> =
            sqlx::query_as::<Postgres, (ProcessingStatus, String)>(
                "SELECT status, storage_key FROM media_files WHERE id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let claimable = matches!(
            &row,
            Some((ProcessingStatus::Pending, key)) if key == source_key
        );
        if !claimable {
            tx.rollback().await?;
            tracing::debug!(
                file_id = id,
                status = ?row.as_ref().map(|(status, _)| *status),
                "Record not claimable"
            );
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'processing',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, changes), fields(change_count = changes.len()))]
    async fn apply_changes(
        &self,
        id: i64,
        source_key: &str,
        changes: &StagedChanges,
    ) -> RepositoryResult<bool> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE media_files SET ");
        let mut set = qb.separated(", ");

        for change in changes.iter() {
            set.push(format!("{} = ", change.field().column()));
            match change {
                FieldChange::MimeType(v)
                | FieldChange::StorageKey(v)
                | FieldChange::ThumbnailKey(v)
                | FieldChange::PreviewKey(v) => {
                    set.push_bind_unseparated(v.clone());
                }
                FieldChange::Width(v) | FieldChange::Height(v) => {
                    set.push_bind_unseparated(to_int(*v));
                }
                FieldChange::Duration(v) => {
                    set.push_bind_unseparated(*v);
                }
            }
        }
        set.push("status = 'success'");
        set.push("updated_at = NOW()");

        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND storage_key = ")
            .push_bind(source_key.to_string());

        let result = qb.build().execute(&self.pool).await.map_err(|e| {
            let key = match changes.get(mediafiles_core::DerivedField::StorageKey) {
                Some(FieldChange::StorageKey(k)) => k.clone(),
                _ => source_key.to_string(),
            };
            map_write_error(e, &key)
        })?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_failed(&self, id: i64, source_key: &str) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'failed',
                updated_at = NOW()
            WHERE id = $1 AND storage_key = $2
            "#,
        )
        .bind(id)
        .bind(source_key)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_owner(&self, owner: &OwnerRef) -> RepositoryResult<Vec<MediaRecord>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM media_files
            WHERE owner_type = $1 AND owner_id = $2
            ORDER BY created_at ASC, id ASC
            "#,
            MEDIA_COLUMNS
        );

        let rows = sqlx::query_as::<Postgres, MediaRow>(&sql)
            .bind(&owner.owner_type)
            .bind(owner.owner_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(MediaRow::into_record).collect()
    }
}
