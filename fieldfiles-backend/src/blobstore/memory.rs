use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use fieldfiles_shared::StorageError;
use tokio::sync::RwLock;

use super::{join_url, BoxReader, Storage};
use crate::entity::Attachment;

/// Blobs in a map, for tests and throwaway setups.
#[derive(Debug)]
pub struct MemoryStorage {
    name: String,
    public_url: String,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new(name: &str, public_url: &str) -> Self {
        Self {
            name: name.to_string(),
            public_url: public_url.to_string(),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.blobs.read().await.contains_key(path)
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload_file(
        &self,
        _attachment: &Attachment,
        source: &Path,
        dest: &str,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(source).await?;
        self.blobs.write().await.insert(dest.to_string(), bytes);
        Ok(())
    }

    fn resolve_url(&self, style: &str, attachment: &Attachment) -> Result<String, StorageError> {
        Ok(join_url(
            &self.public_url,
            &self.upload_path(style, "", attachment),
        ))
    }

    async fn delete_style(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<(), StorageError> {
        let path = self.upload_path(style, format, attachment);
        self.blobs.write().await.remove(&path);
        Ok(())
    }

    async fn stream(
        &self,
        attachment: &Attachment,
        style: &str,
        format: &str,
    ) -> Result<BoxReader, StorageError> {
        let path = self.upload_path(style, format, attachment);
        match self.blobs.read().await.get(&path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(StorageError::NotFound(path)),
        }
    }
}
