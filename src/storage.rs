//! Artifact storage for certificate material and signed documents. Paths are
//! logical keys like `{user_id}/certificates/{file}`; the local backend maps
//! them onto a directory tree under `ARTIFACT_ROOT`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("invalid artifact key: {0}")]
    InvalidKey(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for crate::errors::AppError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(key) => Self::NotFound(format!("artifact {key}")),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Filesystem-backed store. Keys must be relative and free of `..` segments.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("ARTIFACT_ROOT").unwrap_or_else(|_| "artifacts".to_string());
        Self::new(root)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir));
        if key.is_empty() || escapes {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            // removal is used for compensation; a missing file is fine
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
