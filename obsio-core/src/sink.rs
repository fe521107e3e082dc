//! Transactional persistence of transition metadata.
//!
//! Each batch is committed through a fresh connection and a single
//! transaction, so no two workers ever contend on shared session state.
//! A commit is only attempted after every payload the batch references has
//! been confirmed present in the blob store.

use crate::error::{ObsError, Result};
use crate::record::{Episode, EpisodeStatus, TransitionRecord};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

/// Commit target for resolved transition batches.
#[async_trait]
pub trait TransitionSink: Send + Sync {
    /// Persist all records of one batch atomically.
    async fn commit_batch(&self, batch: &[TransitionRecord]) -> Result<()>;
}

/// SQLite-backed transition store.
pub struct TransitionStore {
    db_path: PathBuf,
}

impl TransitionStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    fn get_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS episodes (
                id TEXT PRIMARY KEY,
                game_id TEXT NOT NULL,
                seed INTEGER NOT NULL,
                n_steps INTEGER,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transitions (
                id TEXT PRIMARY KEY,
                episode_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                action INTEGER NOT NULL,
                reward REAL NOT NULL,
                terminated INTEGER NOT NULL,
                truncated INTEGER NOT NULL,
                info TEXT NOT NULL,
                obs_key TEXT,
                next_obs_key TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transitions_episode
             ON transitions(episode_id, step)",
            [],
        )?;

        Ok(())
    }

    /// Register or refresh an episode row.
    pub fn upsert_episode(&self, episode: &Episode) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT OR REPLACE INTO episodes (
                id, game_id, seed, n_steps, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                episode.id,
                episode.game_id,
                episode.seed,
                episode.n_steps,
                episode.status.as_str(),
                episode.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    /// Record an episode's terminal status and step count.
    pub fn finish_episode(&self, id: &str, status: EpisodeStatus, n_steps: i64) -> Result<bool> {
        let conn = self.get_conn()?;

        let affected = conn.execute(
            "UPDATE episodes SET status = ?1, n_steps = ?2 WHERE id = ?3",
            params![status.as_str(), n_steps, id],
        )?;

        Ok(affected > 0)
    }

    pub fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let conn = self.get_conn()?;

        let row: Option<(String, i64, Option<i64>, String, String)> = conn
            .query_row(
                "SELECT game_id, seed, n_steps, status, created_at
                 FROM episodes WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((game_id, seed, n_steps, status, created_at)) => Ok(Some(Episode {
                id: id.to_string(),
                game_id,
                seed,
                n_steps,
                status: EpisodeStatus::parse(&status)
                    .ok_or_else(|| ObsError::Internal(format!("unknown episode status: {}", status)))?,
                created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| ObsError::Internal(e.to_string()))?
                    .with_timezone(&chrono::Utc),
            })),
            None => Ok(None),
        }
    }

    pub fn get_transition(&self, id: &str) -> Result<Option<TransitionRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, episode_id, step, action, reward, terminated, truncated,
                    info, obs_key, next_obs_key, created_at
             FROM transitions WHERE id = ?1",
        )?;

        let record = stmt.query_row([id], row_to_record).optional()?;
        Ok(record)
    }

    /// All transitions of an episode, in step order.
    pub fn list_episode_transitions(&self, episode_id: &str) -> Result<Vec<TransitionRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, episode_id, step, action, reward, terminated, truncated,
                    info, obs_key, next_obs_key, created_at
             FROM transitions WHERE episode_id = ?1 ORDER BY step",
        )?;

        let rows = stmt.query_map([episode_id], row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(records)
    }

    pub fn count_transitions(&self) -> Result<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM transitions", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[async_trait]
impl TransitionSink for TransitionStore {
    async fn commit_batch(&self, batch: &[TransitionRecord]) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for record in batch {
            let info_json = serde_json::to_string(&record.info)?;

            tx.execute(
                "INSERT INTO transitions (
                    id, episode_id, step, action, reward, terminated, truncated,
                    info, obs_key, next_obs_key, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.episode_id,
                    record.step,
                    record.action,
                    record.reward,
                    record.terminated,
                    record.truncated,
                    info_json,
                    record.obs_key,
                    record.next_obs_key,
                    record.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRecord> {
    let info_json: String = row.get(7)?;
    let created_at: String = row.get(10)?;

    Ok(TransitionRecord {
        id: row.get(0)?,
        episode_id: row.get(1)?,
        step: row.get(2)?,
        action: row.get(3)?,
        reward: row.get(4)?,
        terminated: row.get(5)?,
        truncated: row.get(6)?,
        info: serde_json::from_str(&info_json)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
        obs_key: row.get(8)?,
        next_obs_key: row.get(9)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?
            .with_timezone(&chrono::Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, TransitionStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = TransitionStore::new(temp_dir.path().join("obsio.db")).unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_commit_batch_and_readback() {
        let (_guard, store) = temp_store();

        let mut a = TransitionRecord::new("ep-1", 0, 2, 1.0, false, false, json!({}));
        a.obs_key = Some("key-a".to_string());
        let mut b = TransitionRecord::new("ep-1", 1, 3, 0.0, true, false, json!({"lives": 2}));
        b.obs_key = Some("key-a".to_string());
        b.next_obs_key = Some("key-b".to_string());

        store.commit_batch(&[a.clone(), b.clone()]).await.unwrap();

        let rows = store.list_episode_transitions("ep-1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a.id);
        assert_eq!(rows[0].obs_key.as_deref(), Some("key-a"));
        assert_eq!(rows[1].next_obs_key.as_deref(), Some("key-b"));
        assert_eq!(rows[1].info, json!({"lives": 2}));
        assert!(rows[1].terminated);
    }

    #[tokio::test]
    async fn test_episode_lifecycle() {
        let (_guard, store) = temp_store();

        let episode = Episode::new("breakout", 42);
        store.upsert_episode(&episode).unwrap();

        let loaded = store.get_episode(&episode.id).unwrap().unwrap();
        assert_eq!(loaded.game_id, "breakout");
        assert_eq!(loaded.status, EpisodeStatus::Incomplete);
        assert_eq!(loaded.n_steps, None);

        assert!(store
            .finish_episode(&episode.id, EpisodeStatus::Won, 120)
            .unwrap());

        let finished = store.get_episode(&episode.id).unwrap().unwrap();
        assert_eq!(finished.status, EpisodeStatus::Won);
        assert_eq!(finished.n_steps, Some(120));
    }

    #[tokio::test]
    async fn test_count_transitions() {
        let (_guard, store) = temp_store();
        assert_eq!(store.count_transitions().unwrap(), 0);

        let record = TransitionRecord::new("ep-1", 0, 0, 0.0, false, false, json!({}));
        store.commit_batch(&[record]).await.unwrap();
        assert_eq!(store.count_transitions().unwrap(), 1);
    }
}
