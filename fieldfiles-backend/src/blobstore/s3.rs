use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use fieldfiles_shared::StorageError;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use serde::Deserialize;
use tracing::debug;

use super::{content_type, join_url, BoxReader, Storage};
use crate::entity::Attachment;

pub const S3_STORAGE_NAME: &str = "s3";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, GCS interop...)
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Base URL blobs are served from, defaults to the bucket URL
    pub public_url: Option<String>,
    #[serde(default)]
    pub path_style: bool,
}

/// Keeps blobs in an S3-compatible bucket.
pub struct S3Storage {
    bucket: Box<Bucket>,
    public_url: String,
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket.name())
            .field("public_url", &self.public_url)
            .finish()
    }
}

fn backend_error(err: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn check_status(status: u16, path: &str) -> Result<(), StorageError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(StorageError::NotFound(path.to_string())),
        status => Err(StorageError::Backend(format!(
            "unexpected status {status} for {path}"
        ))),
    }
}

impl S3Storage {
    pub fn new(config: &S3Config) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse::<Region>()
                .map_err(|err| backend_error(format!("invalid region {:?}: {err}", config.region)))?,
        };
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(backend_error)?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(backend_error)?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        let public_url = match &config.public_url {
            Some(url) => url.clone(),
            None => bucket.url(),
        };

        Ok(Self { bucket, public_url })
    }
}

#[async_trait]
impl Storage for S3Storage {
    fn name(&self) -> &str {
        S3_STORAGE_NAME
    }

    async fn upload_file(
        &self,
        attachment: &Attachment,
        source: &Path,
        dest: &str,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(source).await?;
        let format = Path::new(dest)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let response = self
            .bucket
            .put_object_with_content_type(dest, &bytes, &content_type(format, attachment))
            .await
            .map_err(backend_error)?;
        check_status(response.status_code(), dest)?;
        debug!(dest, bytes = bytes.len(), "Stored blob in bucket");
        Ok(())
    }

    fn resolve_url(&self, style: &str, attachment: &Attachment) -> Result<String, StorageError> {
        Ok(join_url(&self.public_url, &self.upload_path(style, "", attachment)))
    }

    async fn delete_style(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<(), StorageError> {
        let path = self.upload_path(style, format, attachment);
        let response = self.bucket.delete_object(&path).await.map_err(backend_error)?;
        match check_status(response.status_code(), &path) {
            Err(StorageError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn stream(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<BoxReader, StorageError> {
        let path = self.upload_path(style, format, attachment);
        let response = self.bucket.get_object(&path).await.map_err(backend_error)?;
        check_status(response.status_code(), &path)?;
        Ok(Box::new(Cursor::new(response.bytes().to_vec())))
    }
}
