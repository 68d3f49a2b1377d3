use mediafiles_db::RepositoryError;
use mediafiles_storage::StorageError;
use thiserror::Error;

/// Errors raised while building or running a processor
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Bad construction parameters. Raised before any I/O.
    #[error("Invalid processor configuration: {0}")]
    Configuration(String),

    #[error("Failed to load source {key}: {source}")]
    Load {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Could not detect MIME type: {0}")]
    Detection(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to probe video: {0}")]
    Probe(String),

    #[error("Failed to encode {artifact}: {message}")]
    Encode { artifact: String, message: String },

    #[error("Failed to store artifact {name}: {source}")]
    Store {
        name: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to commit changes: {0}")]
    Commit(#[source] RepositoryError),

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ProcessingError::Configuration(_))
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
