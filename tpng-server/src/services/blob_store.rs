//! Audio blob storage
//!
//! Transmissions keep an opaque reference to their audio; the bytes live
//! behind [`BlobStore`]. The filesystem store writes flat files under the
//! root folder's `audio/` directory.

use async_trait::async_trait;
use std::path::PathBuf;
use tpng_common::{Error, Result};
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return the reference to persist
    async fn store(&self, bytes: &[u8], extension: &str) -> Result<String>;

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;

    /// Removing a missing blob is not an error
    async fn remove(&self, reference: &str) -> Result<()>;
}

/// Blob store on the local filesystem
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// References are single file names; anything that could escape the
    /// root is rejected
    fn path_for(&self, reference: &str) -> Result<PathBuf> {
        let valid = !reference.is_empty()
            && !reference.contains(|c: char| c == '/' || c == '\\')
            && !reference.starts_with('.');
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid blob reference '{}'", reference)));
        }
        Ok(self.root.join(reference))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: &[u8], extension: &str) -> Result<String> {
        let reference = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.path_for(&reference)?;

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, bytes).await?;

        debug!(reference = %reference, bytes = bytes.len(), "Stored audio blob");
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Audio blob {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let path = self.path_for(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
