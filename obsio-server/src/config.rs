use obsio_core::{BlobStoreConfig, ObsError, Result, UploaderConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: BlobStoreConfig,
    #[serde(default)]
    pub uploader: UploaderSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderSettings {
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batch_wait_ms")]
    pub max_batch_wait_ms: u64,
}

fn default_num_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    8
}

fn default_max_batch_wait_ms() -> u64 {
    500
}

impl Default for UploaderSettings {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            max_batch_wait_ms: default_max_batch_wait_ms(),
        }
    }
}

impl UploaderSettings {
    pub fn to_uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            num_workers: self.num_workers,
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            max_batch_wait: Duration::from_millis(self.max_batch_wait_ms),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path))
            .add_source(::config::Environment::with_prefix("OBSIO").separator("__"))
            .build()
            .map_err(|e| ObsError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| ObsError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  path: ./obsio.db\nstorage:\n  backend: local\n  path: ./storage\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.uploader.num_workers, 1);
        assert_eq!(config.uploader.queue_capacity, 1024);
        assert_eq!(config.uploader.batch_size, 8);
        assert_eq!(config.uploader.max_batch_wait_ms, 500);
        assert!(matches!(config.storage, BlobStoreConfig::Local { .. }));
    }

    #[test]
    fn test_s3_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "database:\n  path: ./obsio.db\n",
                "storage:\n  backend: s3\n  bucket: obs-bucket\n  region: us-east-1\n",
                "  access_key_id: key\n  secret_access_key: secret\n",
                "uploader:\n  num_workers: 4\n  batch_size: 16\n",
            ),
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.uploader.num_workers, 4);
        assert_eq!(config.uploader.batch_size, 16);
        match config.storage {
            BlobStoreConfig::S3(s3) => {
                assert_eq!(s3.bucket, "obs-bucket");
                assert_eq!(s3.endpoint, None);
            }
            other => panic!("expected s3 backend, got {:?}", other),
        }
    }
}
