//! Mediafiles Storage Library
//!
//! Blob storage abstraction for media artifacts, with a local filesystem
//! backend and an in-memory backend.
//!
//! # Storage key format
//!
//! - **Primary blobs**: `{variant}/{uuid}{ext}`, e.g. `imagefile/5b0e...c1.jpg`
//! - **Thumbnails**: `thumb_{primary key}`
//! - **Previews**: `preview_{primary key}`
//!
//! Keys must not contain `..` or a leading `/`. Extensions are always stored
//! lower-cased. Key generation lives in the `keys` module so all backends agree.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediafiles_core::StorageBackend;
pub use memory::InMemoryStorage;
pub use traits::{ArtifactReader, ArtifactStore, StorageError, StorageResult};
