pub mod changes;
pub mod media;
pub mod params;
pub mod status;

pub use changes::{DerivedField, FieldChange, StagedChanges};
pub use media::{
    ImageAttributes, MediaKind, MediaRecord, MediaVariant, NewMediaRecord, OwnerRef,
    VideoAttributes,
};
pub use params::ProcessorParams;
pub use status::ProcessingStatus;
