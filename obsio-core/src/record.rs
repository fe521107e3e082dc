use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// A dense sensory frame produced by one simulation step.
///
/// `shape` describes the tensor layout (e.g. `[210, 160, 3]` for an RGB
/// frame) and `data` holds the row-major bytes. Field order is fixed so the
/// serialized form is identical for identical logical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub shape: Vec<u32>,
    pub data: Vec<u8>,
}

impl Observation {
    pub fn new(shape: Vec<u32>, data: Vec<u8>) -> Self {
        Self { shape, data }
    }
}

/// Terminal status of a recorded episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    Incomplete,
    Won,
    Lost,
}

impl EpisodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodeStatus::Incomplete => "incomplete",
            EpisodeStatus::Won => "won",
            EpisodeStatus::Lost => "lost",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "incomplete" => Some(EpisodeStatus::Incomplete),
            "won" => Some(EpisodeStatus::Won),
            "lost" => Some(EpisodeStatus::Lost),
            _ => None,
        }
    }
}

/// One recorded play session for a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub game_id: String,
    pub seed: i64,
    pub n_steps: Option<i64>,
    pub status: EpisodeStatus,
    pub created_at: DateTime<Utc>,
}

impl Episode {
    pub fn new(game_id: impl Into<String>, seed: i64) -> Self {
        Self {
            id: Ulid::new().to_string(),
            game_id: game_id.into(),
            seed,
            n_steps: None,
            status: EpisodeStatus::Incomplete,
            created_at: Utc::now(),
        }
    }
}

/// Metadata row for one simulation step.
///
/// `obs_key` and `next_obs_key` stay `None` until the corresponding payload
/// upload resolves; the row is only persisted once every referenced payload
/// is confirmed present in the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: String,
    pub episode_id: String,
    pub step: i64,
    pub action: i64,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: serde_json::Value,
    pub obs_key: Option<String>,
    pub next_obs_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(
        episode_id: impl Into<String>,
        step: i64,
        action: i64,
        reward: f64,
        terminated: bool,
        truncated: bool,
        info: serde_json::Value,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            episode_id: episode_id.into(),
            step,
            action,
            reward,
            terminated,
            truncated,
            info,
            obs_key: None,
            next_obs_key: None,
            created_at: Utc::now(),
        }
    }
}

/// One unit of work handed to the upload pipeline: the transition row plus
/// the raw frame(s) it references. Immutable after creation.
#[derive(Debug, Clone)]
pub struct StepUpload {
    pub record: TransitionRecord,
    pub obs: Observation,
    pub next_obs: Option<Observation>,
}

impl StepUpload {
    pub fn new(record: TransitionRecord, obs: Observation, next_obs: Option<Observation>) -> Self {
        Self {
            record,
            obs,
            next_obs,
        }
    }
}
