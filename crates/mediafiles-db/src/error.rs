use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Media record not found: {0}")]
    NotFound(i64),

    #[error("Storage key already in use: {0}")]
    DuplicateKey(String),

    #[error("Media record {id} cannot change variant from {from} to {to}")]
    VariantMismatch { id: i64, from: String, to: String },

    #[error("Invalid media row {id}: {reason}")]
    InvalidRow { id: i64, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;
