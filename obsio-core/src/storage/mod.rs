//! Blob storage backends for encoded observation payloads.
//!
//! The pipeline depends only on the `BlobStore` capability; the concrete
//! backend (S3-compatible object store or local filesystem directory) is
//! selected by configuration at startup.

pub mod local;
pub mod remote;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use local::LocalBlobStore;
pub use remote::RemoteBlobStore;

/// Capability contract for a content-addressed blob backend.
///
/// Calls are stateless and safe for concurrent use from multiple workers.
/// `put` with identical bytes to the same name is idempotent, so the
/// check-then-act race between `exists` and `put` is harmless.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether an object with this name is already present.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Store the full buffer under this name.
    async fn put(&self, name: &str, data: Bytes) -> Result<()>;

    /// Release any held backend resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Upload protocol for a single payload: skip the write when the object is
/// already present (content-addressed names make the overwrite race benign).
pub async fn upload_if_absent(store: &dyn BlobStore, name: &str, data: Bytes) -> Result<()> {
    if store.exists(name).await? {
        tracing::debug!("Blob {} exists; skipping upload", name);
        return Ok(());
    }

    tracing::debug!("Blob {} new; uploading {} bytes", name, data.len());
    store.put(name, data).await
}

/// Backend selection, deserialized from the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BlobStoreConfig {
    Local { path: PathBuf },
    S3(S3Config),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Build the configured backend. Permanent failures (unwritable base
/// directory, bad credentials, missing bucket) surface here and are fatal
/// for the caller.
pub async fn open_blob_store(config: &BlobStoreConfig) -> Result<Arc<dyn BlobStore>> {
    match config {
        BlobStoreConfig::Local { path } => {
            let store = LocalBlobStore::new(path.clone())?;
            Ok(Arc::new(store))
        }
        BlobStoreConfig::S3(s3) => {
            let store = RemoteBlobStore::open(s3).await?;
            Ok(Arc::new(store))
        }
    }
}
