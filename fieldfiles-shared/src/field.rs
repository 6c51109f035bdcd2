//! Describes one attachment-bearing field on an owning record.

use serde::{Deserialize, Serialize};

use crate::attachment::AttachmentKind;

/// Selects the `(modelName, field)` partition of an association table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub model_name: String,
    pub field_name: String,
    pub kind: AttachmentKind,
}

impl FieldConfig {
    pub fn new(kind: AttachmentKind, model_name: &str, field_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            field_name: field_name.to_string(),
            kind,
        }
    }

    /// A field holding files, eg `content.attachments`
    pub fn files(model_name: &str, field_name: &str) -> Self {
        Self::new(AttachmentKind::File, model_name, field_name)
    }

    /// A field holding images, eg `content.images` or `user.avatar`
    pub fn images(model_name: &str, field_name: &str) -> Self {
        Self::new(AttachmentKind::Image, model_name, field_name)
    }
}
