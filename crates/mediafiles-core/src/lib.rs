//! Mediafiles Core Library
//!
//! Domain models, configuration and shared constants used by every mediafiles crate.
//! Nothing in here performs I/O apart from reading the process environment.

pub mod config;
pub mod constants;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, LogFormat};
pub use models::{
    DerivedField, FieldChange, ImageAttributes, MediaKind, MediaRecord, MediaVariant,
    NewMediaRecord, OwnerRef, ProcessingStatus, ProcessorParams, StagedChanges,
    VideoAttributes,
};
pub use storage_types::StorageBackend;
