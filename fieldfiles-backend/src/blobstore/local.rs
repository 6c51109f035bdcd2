use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use fieldfiles_shared::StorageError;
use tokio::fs;
use tokio::io::BufReader;
use tracing::debug;

use super::{join_url, BoxReader, Storage};
use crate::entity::Attachment;

pub const LOCAL_STORAGE_NAME: &str = "local";

/// Keeps blobs under a directory on local disk.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
    public_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a logical path onto disk, refusing anything that would leave the root.
    pub fn resolve_path(&self, logical: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(logical);
        if logical.is_empty() || relative.is_absolute() {
            return Err(StorageError::InvalidPath(logical.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(logical.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        LOCAL_STORAGE_NAME
    }

    async fn upload_file(
        &self,
        _attachment: &Attachment,
        source: &Path,
        dest: &str,
    ) -> Result<(), StorageError> {
        let target = self.resolve_path(dest)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = fs::copy(source, &target).await?;
        debug!(dest, bytes, "Stored blob on disk");
        Ok(())
    }

    fn resolve_url(&self, style: &str, attachment: &Attachment) -> Result<String, StorageError> {
        let path = self.upload_path(style, "", attachment);
        self.resolve_path(&path)?;
        Ok(join_url(&self.public_url, &path))
    }

    async fn delete_style(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<(), StorageError> {
        let target = self.resolve_path(&self.upload_path(style, format, attachment))?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn stream(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<BoxReader, StorageError> {
        let logical = self.upload_path(style, format, attachment);
        let target = self.resolve_path(&logical)?;
        match fs::File::open(&target).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(logical))
            }
            Err(err) => Err(err.into()),
        }
    }
}
