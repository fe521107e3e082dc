use crate::error::Result;
use crate::storage::BlobStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;

/// Filesystem-backed blob store rooted at a base directory.
///
/// `put` writes the full buffer in one call. An interrupted write leaves a
/// truncated file that `exists` would still report present; content is not
/// validated on the read-back path here.
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn object_path(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.object_path(name).exists())
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.object_path(name);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&path, &data).await?;

        tracing::debug!("Local storage: stored {} ({} bytes)", name, data.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_exists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        let name = "obs/abc123.json.zz";
        assert!(!store.exists(name).await.unwrap());

        store.put(name, Bytes::from_static(b"frame")).await.unwrap();
        assert!(store.exists(name).await.unwrap());

        let on_disk = std::fs::read(temp_dir.path().join(name)).unwrap();
        assert_eq!(on_disk, b"frame");
    }

    #[tokio::test]
    async fn test_put_creates_parent_directories() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf()).unwrap();

        store
            .put("obs/nested/key.json.zz", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(store.exists("obs/nested/key.json.zz").await.unwrap());
    }
}
