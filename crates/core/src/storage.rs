use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no stored object for key: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage collaborator. The ingestion pipeline only consumes `fetch`;
/// `store` and `delete` serve the upload and document-delete flows.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn store(&self, bytes: &[u8], key: &str) -> Result<(), StorageError>;

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Derives the storage key for one document's bytes. The document id keeps
/// keys unique across byte-identical uploads, so deleting one document never
/// removes a blob another document still references; the digest makes a
/// stale blob detectable.
pub fn storage_key(workspace_id: &str, document_id: Uuid, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}/{}-{:x}.pdf", workspace_id, document_id, hasher.finalize())
}

/// Blob storage on the local filesystem, keys mapped to paths under a root.
pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }
}

#[async_trait]
impl BlobStorage for FsBlobStorage {
    async fn store(&self, bytes: &[u8], key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// In-memory blob storage for tests.
#[derive(Default)]
pub struct MemoryBlobStorage {
    objects: tokio::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn store(&self, bytes: &[u8], key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
