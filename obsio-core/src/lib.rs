//! Obsio Core - Asynchronous observation upload pipeline for interactive sessions
//!
//! A real-time session's tick loop hands every recorded step to a bounded,
//! non-blocking queue. Worker tasks drain the queue in batches:
//! - canonical zlib-compressed encoding, blake3 content addressing
//! - deduplicated uploads to an S3-compatible or local filesystem backend
//! - SQLite for transition metadata, one transaction per batch
//! - drain-then-cancel shutdown so pre-shutdown work always completes

pub mod encode;
pub mod error;
pub mod record;
pub mod sink;
pub mod storage;
pub mod uploader;

pub use encode::{blob_name, content_key, decode_observation, encode_observation, OBS_EXT};
pub use error::{ObsError, Result};
pub use record::{Episode, EpisodeStatus, Observation, StepUpload, TransitionRecord};
pub use sink::{TransitionSink, TransitionStore};
pub use storage::{
    open_blob_store, upload_if_absent, BlobStore, BlobStoreConfig, LocalBlobStore, RemoteBlobStore,
    S3Config,
};
pub use uploader::{Uploader, UploaderConfig};
