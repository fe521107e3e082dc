use crate::encode::OBS_PREFIX;
use crate::error::{ObsError, Result};
use crate::storage::{BlobStore, S3Config};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;

/// Blob store backed by an S3-compatible object store.
///
/// `open` probes the bucket once so permanent problems (bad credentials,
/// missing bucket) fail at startup instead of on the first worker upload.
/// Transient errors on `exists`/`put` propagate to the caller unchanged.
pub struct RemoteBlobStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl RemoteBlobStore {
    pub async fn open(config: &S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(config.bucket.as_str())
            .with_region(config.region.as_str())
            .with_access_key_id(config.access_key_id.as_str())
            .with_secret_access_key(config.secret_access_key.as_str());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint.as_str()).with_allow_http(true);
        }

        let store: Arc<dyn ObjectStore> = Arc::new(builder.build()?);

        let probe = Self {
            store,
            bucket: config.bucket.clone(),
        };
        probe.check_bucket().await?;

        Ok(probe)
    }

    async fn check_bucket(&self) -> Result<()> {
        let mut listing = self.store.list(Some(&ObjectPath::from(OBS_PREFIX)));

        match listing.next().await {
            Some(Err(error)) => Err(ObsError::Config(format!(
                "S3 bucket '{}' is not accessible: {}",
                self.bucket, error
            ))),
            _ => {
                tracing::info!("S3 bucket '{}' is accessible", self.bucket);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl BlobStore for RemoteBlobStore {
    async fn exists(&self, name: &str) -> Result<bool> {
        let path = ObjectPath::from(name);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn put(&self, name: &str, data: Bytes) -> Result<()> {
        let path = ObjectPath::from(name);
        self.store.put(&path, PutPayload::from(data)).await?;
        Ok(())
    }
}
