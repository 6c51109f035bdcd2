//! Turns a file on local disk into a stored, saved attachment
//!

use std::path::Path;
use std::sync::Arc;

use fieldfiles_shared::{AttachmentError, AttachmentKind, ORIGINAL_STYLE};
use tempfile::TempPath;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::blobstore::Storages;
use crate::config::UploadConfig;
use crate::db::AttachmentStore;
use crate::entity::Attachment;
use crate::processor::ImageProcessor;
use crate::style::seed_placeholders;

/// Caller supplied details about an upload.
#[derive(Clone, Debug, Default)]
pub struct UploadMetadata {
    /// File name as the user sent it
    pub original_name: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub creator_id: Option<i64>,
}

impl UploadMetadata {
    pub fn new(original_name: &str) -> Self {
        Self {
            original_name: original_name.to_string(),
            ..Default::default()
        }
    }
}

/// An empty temp file, removed when the returned path is dropped.
pub(crate) fn scratch_path(suffix: &str) -> Result<TempPath, AttachmentError> {
    let file = tempfile::Builder::new()
        .prefix("fieldfiles-")
        .suffix(&format!("-{suffix}"))
        .tempfile()
        .inspect_err(|err| error!(?err, "Failed to create scratch file"))?;
    Ok(file.into_temp_path())
}

/// Mime type and extension of a file, from its magic bytes or else the
/// extension of the name it was uploaded with.
pub fn detect_type(
    path: &Path,
    original_name: &str,
) -> Result<(Option<String>, Option<String>), AttachmentError> {
    let sniffed = infer::get_from_path(path).map_err(|err| {
        AttachmentError::Validation(format!("unable to read {}: {err}", path.display()))
    })?;
    if let Some(kind) = sniffed {
        return Ok((
            Some(kind.mime_type().to_string()),
            Some(kind.extension().to_string()),
        ));
    }

    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .filter(|ext| !ext.is_empty());
    let mime = mime_guess::from_path(original_name)
        .first()
        .map(|mime| mime.essence_str().to_string());
    Ok((mime, extension))
}

fn storage_name(extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

#[derive(Clone)]
pub struct UploadPipeline {
    store: AttachmentStore,
    storages: Storages,
    processor: Arc<dyn ImageProcessor>,
    config: UploadConfig,
}

impl UploadPipeline {
    pub fn new(
        store: AttachmentStore,
        storages: Storages,
        processor: Arc<dyn ImageProcessor>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            storages,
            processor,
            config,
        }
    }

    /// Stores `raw` and saves a new attachment for it. Nothing is saved
    /// unless every step succeeded.
    #[instrument(level = "info", skip(self, raw, metadata), fields(original_name = %metadata.original_name))]
    pub async fn upload(
        &self,
        kind: AttachmentKind,
        raw: &Path,
        metadata: UploadMetadata,
        storage: Option<&str>,
    ) -> Result<Attachment, AttachmentError> {
        let source_meta = tokio::fs::metadata(raw).await.map_err(|err| {
            AttachmentError::Validation(format!("unable to read {}: {err}", raw.display()))
        })?;
        if !source_meta.is_file() {
            return Err(AttachmentError::Validation(format!(
                "{} is not a file",
                raw.display()
            )));
        }

        let mut attachment = match kind {
            AttachmentKind::File => self.upload_file(raw, &metadata, storage).await,
            AttachmentKind::Image => self.upload_image(raw, &metadata, storage).await,
        }
        .inspect_err(|err| error!(?err, "Upload failed"))?;

        if let Err(err) = self.store.save(&mut attachment).await {
            error!(?err, "Failed to save upload, removing stored blob");
            self.discard_blob(&attachment).await;
            return Err(err);
        }
        info!(
            kind = %attachment.kind,
            id = attachment.id,
            name = %attachment.name,
            storage = %attachment.storage_name,
            "Stored upload"
        );
        Ok(attachment)
    }

    /// Best effort removal of an original that no row will point at.
    async fn discard_blob(&self, attachment: &Attachment) {
        let format = attachment.extension.clone().unwrap_or_default();
        let res = match self.storages.for_attachment(attachment) {
            Ok(storage) => storage
                .delete_style(attachment, ORIGINAL_STYLE, &format)
                .await
                .map_err(AttachmentError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = res {
            warn!(?err, name = %attachment.name, "Failed to remove orphaned blob");
        }
    }

    fn new_attachment(
        &self,
        kind: AttachmentKind,
        name: String,
        metadata: &UploadMetadata,
        storage: &str,
    ) -> Attachment {
        let mut attachment =
            Attachment::new(kind, name, metadata.original_name.clone(), storage);
        attachment.label = metadata.label.clone();
        attachment.description = metadata.description.clone();
        attachment.creator_id = metadata.creator_id;
        attachment
    }

    async fn upload_file(
        &self,
        raw: &Path,
        metadata: &UploadMetadata,
        storage: Option<&str>,
    ) -> Result<Attachment, AttachmentError> {
        let storage = self.storages.get(storage)?;
        let (mime, extension) = detect_type(raw, &metadata.original_name)?;

        let mut attachment = self.new_attachment(
            AttachmentKind::File,
            storage_name(extension.as_deref()),
            metadata,
            storage.name(),
        );
        attachment.mime = mime;
        attachment.extension = extension;
        attachment.size = Some(file_size(raw).await?);

        let dest = storage.upload_path(ORIGINAL_STYLE, "", &attachment);
        storage.upload_file(&attachment, raw, &dest).await?;
        attachment
            .urls
            .set(ORIGINAL_STYLE, storage.resolve_url(ORIGINAL_STYLE, &attachment)?);
        Ok(attachment)
    }

    async fn upload_image(
        &self,
        raw: &Path,
        metadata: &UploadMetadata,
        storage: Option<&str>,
    ) -> Result<Attachment, AttachmentError> {
        let storage = self.storages.get(storage)?;
        let (detected_mime, detected_ext) = detect_type(raw, &metadata.original_name)?;

        let keep_as_is = detected_ext
            .as_deref()
            .is_some_and(|ext| self.config.ignores(ext));

        let options = self.config.original_options();
        let (extension, mime) = match (&options.format, keep_as_is) {
            (Some(format), false) => (
                Some(format.clone()),
                Some(
                    mime_guess::from_ext(format)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string(),
                ),
            ),
            _ => (detected_ext, detected_mime),
        };

        let mut attachment = self.new_attachment(
            AttachmentKind::Image,
            storage_name(extension.as_deref()),
            metadata,
            storage.name(),
        );
        attachment.mime = mime;
        attachment.extension = extension;

        let format = attachment.extension.clone().unwrap_or_default();
        let dest = storage.upload_path(ORIGINAL_STYLE, &format, &attachment);

        if keep_as_is {
            debug!(?attachment.extension, "Storing image untouched");
            attachment.size = Some(file_size(raw).await?);
            storage.upload_file(&attachment, raw, &dest).await?;
        } else {
            let converted = scratch_path(&attachment.name)?;
            self.processor.resize(raw, &converted, &options).await?;
            attachment.size = Some(file_size(&converted).await?);
            storage.upload_file(&attachment, &converted, &dest).await?;
        }

        attachment
            .urls
            .set(ORIGINAL_STYLE, storage.resolve_url(ORIGINAL_STYLE, &attachment)?);
        seed_placeholders(&self.config, &mut attachment, false);
        Ok(attachment)
    }
}

async fn file_size(path: &Path) -> Result<i64, AttachmentError> {
    let len = tokio::fs::metadata(path).await?.len();
    Ok(i64::try_from(len).unwrap_or(i64::MAX))
}
