//! Staged mutations produced by processors.
//!
//! Processors never write to persistence directly. They accumulate
//! [`FieldChange`]s in a [`StagedChanges`] value which is then written in a
//! single update together with the terminal status.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Derived (non user-editable) fields a processor may write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedField {
    MimeType,
    Width,
    Height,
    Duration,
    StorageKey,
    ThumbnailKey,
    PreviewKey,
}

impl DerivedField {
    /// Column name in the `media_files` table.
    pub fn column(&self) -> &'static str {
        match self {
            DerivedField::MimeType => "mime_type",
            DerivedField::Width => "width",
            DerivedField::Height => "height",
            DerivedField::Duration => "duration_seconds",
            DerivedField::StorageKey => "storage_key",
            DerivedField::ThumbnailKey => "thumbnail_key",
            DerivedField::PreviewKey => "preview_key",
        }
    }

    /// Fields whose value is an artifact key.
    pub fn is_artifact(&self) -> bool {
        matches!(
            self,
            DerivedField::StorageKey | DerivedField::ThumbnailKey | DerivedField::PreviewKey
        )
    }
}

impl Display for DerivedField {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.column())
    }
}

/// A pending mutation of one derived field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    MimeType(String),
    Width(u32),
    Height(u32),
    Duration(f64),
    StorageKey(String),
    ThumbnailKey(String),
    PreviewKey(String),
}

impl FieldChange {
    pub fn field(&self) -> DerivedField {
        match self {
            FieldChange::MimeType(_) => DerivedField::MimeType,
            FieldChange::Width(_) => DerivedField::Width,
            FieldChange::Height(_) => DerivedField::Height,
            FieldChange::Duration(_) => DerivedField::Duration,
            FieldChange::StorageKey(_) => DerivedField::StorageKey,
            FieldChange::ThumbnailKey(_) => DerivedField::ThumbnailKey,
            FieldChange::PreviewKey(_) => DerivedField::PreviewKey,
        }
    }

    /// Builds the change for an artifact field from a stored key.
    ///
    /// Returns `None` when `field` does not hold a key.
    pub fn artifact(field: DerivedField, key: String) -> Option<Self> {
        match field {
            DerivedField::StorageKey => Some(FieldChange::StorageKey(key)),
            DerivedField::ThumbnailKey => Some(FieldChange::ThumbnailKey(key)),
            DerivedField::PreviewKey => Some(FieldChange::PreviewKey(key)),
            _ => None,
        }
    }
}

/// Insertion-ordered accumulator of field changes.
///
/// Staging a field that is already present replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedChanges {
    changes: Vec<FieldChange>,
}

impl StagedChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, change: FieldChange) {
        let field = change.field();
        match self.changes.iter_mut().find(|c| c.field() == field) {
            Some(existing) => *existing = change,
            None => self.changes.push(change),
        }
    }

    pub fn get(&self, field: DerivedField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field() == field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restaging_replaces_in_place() {
        let mut changes = StagedChanges::new();
        changes.stage(FieldChange::MimeType("text/plain".to_string()));
        changes.stage(FieldChange::Width(10));
        changes.stage(FieldChange::MimeType("image/png".to_string()));

        assert_eq!(changes.len(), 2);
        let fields: Vec<_> = changes.iter().map(|c| c.field()).collect();
        assert_eq!(fields, vec![DerivedField::MimeType, DerivedField::Width]);
        assert_eq!(
            changes.get(DerivedField::MimeType),
            Some(&FieldChange::MimeType("image/png".to_string()))
        );
    }

    #[test]
    fn artifact_constructor_rejects_scalar_fields() {
        assert!(FieldChange::artifact(DerivedField::Width, "k".to_string()).is_none());
        assert_eq!(
            FieldChange::artifact(DerivedField::PreviewKey, "preview_k".to_string()),
            Some(FieldChange::PreviewKey("preview_k".to_string()))
        );
    }
}
