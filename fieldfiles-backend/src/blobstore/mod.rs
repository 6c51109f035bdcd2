//! Where attachment bytes live
//!

mod local;
mod memory;
mod s3;

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::{S3Config, S3Storage};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use fieldfiles_shared::{AttachmentError, StorageError};
use tokio::io::AsyncRead;

use crate::entity::Attachment;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A backend holding the original and derived blobs of attachments.
///
/// Blobs are addressed by a logical path, `<yyyy>/<mm>/<dd>/<style>/<name>`,
/// dated by when the attachment was created. The `format` arguments name
/// the encoding of the blob; backends that record a content type use it,
/// the path itself only depends on the style and the attachment's name.
#[async_trait]
pub trait Storage: Send + Sync {
    /// The name attachments record in `storageName`.
    fn name(&self) -> &str;

    /// Copies a local file to `dest`.
    async fn upload_file(
        &self,
        attachment: &Attachment,
        source: &Path,
        dest: &str,
    ) -> Result<(), StorageError>;

    fn upload_path(&self, style: &str, _format: &str, attachment: &Attachment) -> String {
        logical_path(style, attachment)
    }

    /// Public URL of a style of an attachment.
    fn resolve_url(&self, style: &str, attachment: &Attachment) -> Result<String, StorageError>;

    /// Removes the blob of one style. Missing blobs are not an error.
    async fn delete_style(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<(), StorageError>;

    async fn stream(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<BoxReader, StorageError>;
}

pub fn logical_path(style: &str, attachment: &Attachment) -> String {
    format!(
        "{}/{}/{}",
        attachment.created_at.format("%Y/%m/%d"),
        style,
        attachment.name
    )
}

/// Joins a public base URL and a logical path.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Content type for a blob, from its format or the attachment's extension.
pub(crate) fn content_type(format: &str, attachment: &Attachment) -> String {
    let ext = match format.trim() {
        "" => attachment.extension.as_deref().unwrap_or_default(),
        format => format,
    };
    mime_guess::from_ext(ext)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Named storage backends, one of which is the default for new uploads.
#[derive(Clone)]
pub struct Storages {
    backends: HashMap<String, Arc<dyn Storage>>,
    default: String,
}

impl std::fmt::Debug for Storages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storages")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}

impl Storages {
    pub fn new(default: Arc<dyn Storage>) -> Self {
        let name = default.name().to_string();
        let mut backends = HashMap::new();
        backends.insert(name.clone(), default);
        Self {
            backends,
            default: name,
        }
    }

    /// Registers another backend. A backend with the same name is replaced.
    pub fn with(mut self, backend: Arc<dyn Storage>) -> Self {
        self.backends.insert(backend.name().to_string(), backend);
        self
    }

    /// Makes an already registered backend the default.
    pub fn with_default(mut self, name: &str) -> Result<Self, AttachmentError> {
        if !self.backends.contains_key(name) {
            return Err(AttachmentError::Configuration(format!(
                "unknown storage backend {name:?}"
            )));
        }
        self.default = name.to_string();
        Ok(self)
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// The named backend, or the default one for `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn Storage>, AttachmentError> {
        let name = name.unwrap_or(&self.default);
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| AttachmentError::Validation(format!("unknown storage backend {name:?}")))
    }

    /// The backend holding an attachment's bytes.
    pub fn for_attachment(&self, attachment: &Attachment) -> Result<Arc<dyn Storage>, AttachmentError> {
        match attachment.storage_name.as_str() {
            "" => self.get(None),
            name => self.get(Some(name)),
        }
    }
}
