//! Derived image styles, generated the first time they are asked for
//!

use std::sync::Arc;

use fieldfiles_shared::{AttachmentError, AttachmentKind, ORIGINAL_STYLE};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument};

use crate::blobstore::Storages;
use crate::config::UploadConfig;
use crate::db::AttachmentStore;
use crate::entity::Attachment;
use crate::processor::{ImageProcessor, ResizeOptions};
use crate::upload::scratch_path;

/// Points every configured style without a URL at the resolver. With
/// `overwrite`, styles that already have a URL are pointed back too.
pub(crate) fn seed_placeholders(config: &UploadConfig, attachment: &mut Attachment, overwrite: bool) {
    for (style, _) in config.derived_styles() {
        if overwrite || !attachment.urls.contains(style) {
            let url = config.placeholder_url(style, &attachment.name);
            attachment.urls.set(style, url);
        }
    }
}

#[derive(Clone)]
pub struct StyleResolver {
    store: AttachmentStore,
    storages: Storages,
    processor: Arc<dyn ImageProcessor>,
    config: UploadConfig,
}

impl StyleResolver {
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

    /// URL of `style`, generating and saving it first when needed.
    pub async fn resolve_style(
        &self,
        attachment: &mut Attachment,
        style: &str,
    ) -> Result<String, AttachmentError> {
        self.resolve(attachment, style, false).await
    }

    /// Like [`StyleResolver::resolve_style`] but regenerates the blob even
    /// when a URL is already stored.
    pub async fn resolve_style_forced(
        &self,
        attachment: &mut Attachment,
        style: &str,
    ) -> Result<String, AttachmentError> {
        self.resolve(attachment, style, true).await
    }

    #[instrument(level = "debug", skip(self, attachment), fields(id = attachment.id, name = %attachment.name))]
    async fn resolve(
        &self,
        attachment: &mut Attachment,
        style: &str,
        force: bool,
    ) -> Result<String, AttachmentError> {
        if style == ORIGINAL_STYLE {
            return attachment
                .urls
                .original()
                .map(str::to_string)
                .ok_or_else(|| {
                    AttachmentError::NotFound(format!(
                        "{} {} has no original url",
                        attachment.kind, attachment.id
                    ))
                });
        }
        if attachment.kind != AttachmentKind::Image {
            return Err(AttachmentError::Validation(format!(
                "styles only apply to images, {} {} is a {}",
                attachment.kind, attachment.id, attachment.kind
            )));
        }
        let style_config = self.config.style(style).ok_or_else(|| {
            AttachmentError::Validation(format!("unknown image style {style:?}"))
        })?;

        if !force {
            if let Some(url) = attachment.urls.get(style) {
                if !self.config.is_placeholder(url, style, &attachment.name) {
                    return Ok(url.to_string());
                }
            }
        }

        let storage = self.storages.for_attachment(attachment)?;
        let source_format = attachment.extension.clone().unwrap_or_default();

        let original = scratch_path(&format!("original-{}", attachment.name))?;
        {
            let mut reader = storage
                .stream(attachment, ORIGINAL_STYLE, &source_format)
                .await
                .inspect_err(|err| error!(?err, "Failed to fetch original"))?;
            let mut file = tokio::fs::File::create(&original).await?;
            tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
        }

        let derived = scratch_path(&format!("{style}-{}", attachment.name))?;
        let options = ResizeOptions::from(style_config);
        self.processor
            .resize(&original, &derived, &options)
            .await?;

        let format = options.format.unwrap_or(source_format);
        let dest = storage.upload_path(style, &format, attachment);
        storage
            .upload_file(attachment, &derived, &dest)
            .await?;

        let url = storage.resolve_url(style, attachment)?;
        attachment.urls.set(style, url.clone());
        self.store.save(attachment).await?;
        info!(style, %url, "Generated image style");
        Ok(url)
    }

    /// Deletes every derived blob and points the styles back at the resolver.
    #[instrument(level = "debug", skip(self, attachment), fields(id = attachment.id, name = %attachment.name))]
    pub async fn reset_styles(&self, attachment: &mut Attachment) -> Result<(), AttachmentError> {
        let storage = self.storages.for_attachment(attachment)?;
        let styles: Vec<String> = attachment
            .urls
            .styles()
            .filter(|style| *style != ORIGINAL_STYLE)
            .map(str::to_string)
            .collect();

        for style in styles {
            let format = self
                .config
                .style(&style)
                .map(|s| s.format.clone())
                .unwrap_or_default();
            storage
                .delete_style(attachment, &style, &format)
                .await
                .inspect_err(|err| error!(?err, %style, "Failed to delete style blob"))?;
            attachment.urls.remove(&style);
            debug!(%style, "Removed style");
        }

        if attachment.kind == AttachmentKind::Image {
            seed_placeholders(&self.config, attachment, false);
        }
        self.store.save(attachment).await
    }

    /// Marks every style as pending so the next request regenerates it.
    /// Existing blobs stay until they are overwritten.
    pub async fn reprocess(&self, attachment: &mut Attachment) -> Result<(), AttachmentError> {
        if attachment.urls.original().is_none() {
            let storage = self.storages.for_attachment(attachment)?;
            let url = storage.resolve_url(ORIGINAL_STYLE, attachment)?;
            attachment.urls.set(ORIGINAL_STYLE, url);
        }
        if attachment.kind == AttachmentKind::Image {
            seed_placeholders(&self.config, attachment, true);
        }
        self.store.save(attachment).await
    }
}
