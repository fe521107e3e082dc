//! Replay a captured session through the upload pipeline.
//!
//! Input is JSONL: one step entry per line, observation tensors inline.
//! Malformed lines are skipped with a warning; the pipeline's own error
//! policy covers everything past the queue.

use anyhow::Context;
use crate::config::Config;
use obsio_core::{
    open_blob_store, Episode, EpisodeStatus, Observation, StepUpload, TransitionRecord,
    TransitionSink, TransitionStore, Uploader,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct StepEntry {
    pub episode_id: String,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
    pub step: i64,
    pub action: i64,
    pub reward: f64,
    #[serde(default)]
    pub terminated: bool,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub info: serde_json::Value,
    pub obs: Observation,
    #[serde(default)]
    pub next_obs: Option<Observation>,
    /// Terminal status for the episode, present on its final entry.
    #[serde(default)]
    pub outcome: Option<EpisodeStatus>,
}

pub async fn run_ingest(config: Config, path: &str) -> anyhow::Result<()> {
    let store = open_blob_store(&config.storage)
        .await
        .context("initializing blob store")?;
    let sink = Arc::new(
        TransitionStore::new(config.database.path.clone()).context("opening transition store")?,
    );

    let mut uploader = Uploader::new(
        config.uploader.to_uploader_config(),
        store,
        Arc::clone(&sink) as Arc<dyn TransitionSink>,
    );
    uploader.start();

    let file = std::fs::File::open(path)
        .with_context(|| format!("opening capture file {}", path))?;
    let reader = BufReader::new(file);

    let mut seen_episodes: HashSet<String> = HashSet::new();
    let mut enqueued = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let entry: StepEntry = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!("Skipping malformed entry at line {}: {}", line_no + 1, error);
                continue;
            }
        };

        if seen_episodes.insert(entry.episode_id.clone()) {
            let episode = Episode {
                id: entry.episode_id.clone(),
                game_id: entry.game_id.clone().unwrap_or_else(|| "unknown".to_string()),
                seed: entry.seed.unwrap_or(0),
                n_steps: None,
                status: EpisodeStatus::Incomplete,
                created_at: chrono::Utc::now(),
            };
            sink.upsert_episode(&episode)?;
        }

        if let Some(outcome) = entry.outcome {
            sink.finish_episode(&entry.episode_id, outcome, entry.step + 1)?;
        }

        let record = TransitionRecord::new(
            entry.episode_id,
            entry.step,
            entry.action,
            entry.reward,
            entry.terminated,
            entry.truncated,
            entry.info,
        );

        uploader.put(StepUpload::new(record, entry.obs, entry.next_obs));
        enqueued += 1;
    }

    tracing::info!(
        "Ingest enqueued {} steps; draining ({} outstanding)",
        enqueued,
        uploader.pending()
    );

    uploader.close().await;

    tracing::info!(
        "Ingest complete: {} transitions persisted",
        sink.count_transitions()?
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, UploaderSettings};
    use obsio_core::BlobStoreConfig;

    fn capture_line(episode: &str, step: i64, fill: u8, outcome: Option<&str>) -> String {
        let outcome = outcome
            .map(|o| format!(",\"outcome\":\"{}\"", o))
            .unwrap_or_default();
        format!(
            concat!(
                "{{\"episode_id\":\"{}\",\"game_id\":\"pong\",\"seed\":7,",
                "\"step\":{},\"action\":1,\"reward\":0.5,",
                "\"obs\":{{\"shape\":[2,2],\"data\":[{},{},{},{}]}}{}}}"
            ),
            episode, step, fill, fill, fill, fill, outcome
        )
    }

    #[tokio::test]
    async fn test_ingest_capture_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("capture.jsonl");
        std::fs::write(
            &capture,
            [
                capture_line("ep-1", 0, 1, None),
                "not json".to_string(),
                capture_line("ep-1", 1, 1, None), // duplicate frame bytes
                capture_line("ep-1", 2, 9, Some("won")),
            ]
            .join("\n"),
        )
        .unwrap();

        let config = Config {
            database: DatabaseConfig {
                path: dir.path().join("obsio.db"),
            },
            storage: BlobStoreConfig::Local {
                path: dir.path().join("storage"),
            },
            uploader: UploaderSettings::default(),
        };

        run_ingest(config, capture.to_str().unwrap())
            .await
            .unwrap();

        let sink = TransitionStore::new(dir.path().join("obsio.db")).unwrap();
        let rows = sink.list_episode_transitions("ep-1").unwrap();
        assert_eq!(rows.len(), 3);

        // Steps 0 and 1 carry identical frames and share one blob.
        assert_eq!(rows[0].obs_key, rows[1].obs_key);
        assert_ne!(rows[0].obs_key, rows[2].obs_key);

        let episode = sink.get_episode("ep-1").unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Won);
        assert_eq!(episode.n_steps, Some(3));

        let key = rows[0].obs_key.as_deref().unwrap();
        let blob_path = dir
            .path()
            .join("storage")
            .join(obsio_core::blob_name(key));
        assert!(blob_path.exists());
    }
}
