use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Everything persisted in the backing file, keyed by user id.
pub type ProgressDocument = BTreeMap<String, UserProgress>;

/// One user's records, keyed by tmdb id.
pub type UserProgress = BTreeMap<String, StoredRecord>;

/// A record as found in the backing file.
///
/// Entries written by older clients (a string `timestamp`, say) do not fit
/// `ProgressRecord`; they are kept as raw JSON and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredRecord {
    Progress(ProgressRecord),
    Raw(Value),
}

impl StoredRecord {
    pub fn as_progress(&self) -> Option<&ProgressRecord> {
        match self {
            StoredRecord::Progress(record) => Some(record),
            StoredRecord::Raw(_) => None,
        }
    }
}

impl From<ProgressRecord> for StoredRecord {
    fn from(record: ProgressRecord) -> Self {
        StoredRecord::Progress(record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<Value>,
    pub timestamp: Number,
    pub last_updated: i64,
}

/// Body of `POST /api/progress` as sent by the client, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSubmission {
    #[serde(default)]
    pub tmdb_id: Option<Value>,
    #[serde(default)]
    pub media_type: Option<Value>,
    #[serde(default)]
    pub episode: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidSubmission {
    pub tmdb_id: String,
    pub media_type: String,
    pub episode: Option<Value>,
    pub timestamp: Number,
}

impl ProgressSubmission {
    /// Returns `None` when any of `tmdbId`, `mediaType` or `timestamp` is missing.
    pub fn validate(self) -> Option<ValidSubmission> {
        let tmdb_id = match self.tmdb_id? {
            Value::String(id) if !id.is_empty() => id,
            Value::Number(id) => id.to_string(),
            _ => return None,
        };
        let media_type = match self.media_type? {
            Value::String(kind) if !kind.is_empty() => kind,
            _ => return None,
        };
        let timestamp = match self.timestamp? {
            Value::Number(ts) => ts,
            _ => return None,
        };
        let episode = self.episode.filter(|episode| !episode.is_null());

        Some(ValidSubmission {
            tmdb_id,
            media_type,
            episode,
            timestamp,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveProgressResponse {
    pub status: String,
    pub progress: ProgressRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteProgressResponse {
    pub status: String,
    pub message: String,
}
