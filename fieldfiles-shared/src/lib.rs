//! Types shared between the attachment store, the storage backends and
//! anything that consumes attachment records.

pub mod attachment;
pub mod error;
pub mod field;
pub mod style;

pub use attachment::{AttachmentKind, ExtraData, StyleUrls, ORIGINAL_STYLE};
pub use error::{AttachmentError, StorageError};
pub use field::FieldConfig;
pub use style::ImageStyle;
