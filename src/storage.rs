use crate::errors::AppError;
use crate::models::{ProgressDocument, ProgressRecord, StoredRecord, UserProgress, ValidSubmission};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug)]
enum ReadFailure {
    Unreadable(std::io::Error),
    Malformed(serde_json::Error),
}

/// Per-user progress records kept in a single pretty-printed JSON file.
///
/// Every mutation rewrites the whole document. Mutations hold `write_gate`
/// across their load-modify-save cycle, so writers in one process never
/// overwrite each other's changes.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    write_gate: Mutex<()>,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_gate: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing, unreadable or malformed file reads as empty.
    pub async fn load(&self) -> ProgressDocument {
        match self.read_document().await {
            Ok(document) => document.unwrap_or_default(),
            Err(ReadFailure::Malformed(err)) => {
                error!(path = %self.path.display(), "failed to parse progress file: {err}");
                ProgressDocument::default()
            }
            Err(ReadFailure::Unreadable(err)) => {
                error!(path = %self.path.display(), "failed to read progress file: {err}");
                ProgressDocument::default()
            }
        }
    }

    async fn read_document(&self) -> Result<Option<ProgressDocument>, ReadFailure> {
        match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(ReadFailure::Malformed),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "progress file not found");
                Ok(None)
            }
            Err(err) => Err(ReadFailure::Unreadable(err)),
        }
    }

    /// Loads the document a mutation will rewrite. A malformed file is moved
    /// aside before it can be overwritten; an unreadable one fails the write.
    async fn load_for_write(&self) -> Result<ProgressDocument, AppError> {
        match self.read_document().await {
            Ok(document) => Ok(document.unwrap_or_default()),
            Err(ReadFailure::Malformed(err)) => {
                let aside = self.set_aside_path();
                fs::rename(&self.path, &aside).await.map_err(|rename_err| {
                    error!(path = %self.path.display(), "failed to move malformed progress file: {rename_err}");
                    AppError::internal(rename_err)
                })?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    "malformed progress file moved aside: {err}"
                );
                Ok(ProgressDocument::default())
            }
            Err(ReadFailure::Unreadable(err)) => {
                error!(path = %self.path.display(), "refusing to rewrite unreadable progress file: {err}");
                Err(AppError::internal(err))
            }
        }
    }

    fn set_aside_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{}", Utc::now().timestamp_millis()));
        PathBuf::from(name)
    }

    pub async fn save(&self, document: &ProgressDocument) -> Result<(), AppError> {
        match self.write_document(document).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(path = %self.path.display(), "failed to save progress file: {}", err.message);
                Err(err)
            }
        }
    }

    async fn write_document(&self, document: &ProgressDocument) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let payload = serde_json::to_vec_pretty(document)?;
        let temp_path = self.path.with_extension("json.tmp");
        let written = match fs::write(&temp_path, payload).await {
            Ok(()) => fs::rename(&temp_path, &self.path).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn get_all_for_user(&self, user_id: &str) -> UserProgress {
        self.load().await.remove(user_id).unwrap_or_default()
    }

    pub async fn get_record(&self, user_id: &str, item_id: &str) -> Option<StoredRecord> {
        self.load()
            .await
            .get(user_id)
            .and_then(|items| items.get(item_id))
            .cloned()
    }

    pub async fn upsert_record(
        &self,
        user_id: &str,
        submission: ValidSubmission,
    ) -> Result<ProgressRecord, AppError> {
        let _gate = self.write_gate.lock().await;
        let mut document = self.load_for_write().await?;

        let record = ProgressRecord {
            media_type: submission.media_type,
            episode: submission.episode,
            timestamp: submission.timestamp,
            last_updated: Utc::now().timestamp_millis(),
        };
        document
            .entry(user_id.to_string())
            .or_default()
            .insert(submission.tmdb_id, record.clone().into());

        self.save(&document).await?;
        Ok(record)
    }

    pub async fn delete_record(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<DeleteOutcome, AppError> {
        let _gate = self.write_gate.lock().await;
        let mut document = self.load_for_write().await?;
        let removed = document
            .get_mut(user_id)
            .and_then(|items| items.remove(item_id))
            .is_some();
        if !removed {
            info!(user_id, item_id, "no progress to delete");
            return Ok(DeleteOutcome::NotFound);
        }

        self.save(&document).await?;
        info!(user_id, item_id, "progress deleted");
        Ok(DeleteOutcome::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Number, Value};
    use std::sync::Arc;

    fn temp_store(name: &str) -> ProgressStore {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("progress_api_{name}_{}_{nanos}", std::process::id()));
        path.push("progress.json");
        ProgressStore::new(path)
    }

    fn submission(tmdb_id: &str, media_type: &str, timestamp: u64) -> ValidSubmission {
        ValidSubmission {
            tmdb_id: tmdb_id.to_string(),
            media_type: media_type.to_string(),
            episode: None,
            timestamp: Number::from(timestamp),
        }
    }

    #[tokio::test]
    async fn load_without_file_is_empty() {
        let store = temp_store("missing");
        assert!(store.load().await.is_empty());
        assert!(store.get_all_for_user("anyone").await.is_empty());
    }

    #[tokio::test]
    async fn load_of_malformed_file_is_empty() {
        let store = temp_store("malformed");
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        fs::write(store.path(), b"{ not json").await.unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn upsert_then_get_returns_record() {
        let store = temp_store("upsert");
        let before = Utc::now().timestamp_millis();

        let saved = store
            .upsert_record("alice", submission("603", "movie", 1_700_000_000_000))
            .await
            .unwrap();
        let fetched = store
            .get_record("alice", "603")
            .await
            .and_then(|stored| stored.as_progress().cloned())
            .expect("record stored");

        assert_eq!(fetched, saved);
        assert_eq!(fetched.media_type, "movie");
        assert_eq!(fetched.timestamp.as_u64(), Some(1_700_000_000_000));
        assert!(fetched.last_updated >= before);
        assert!(store.get_record("bob", "603").await.is_none());
    }

    #[tokio::test]
    async fn saved_file_is_two_space_indented() {
        let store = temp_store("pretty");
        store
            .upsert_record("alice", submission("603", "movie", 1))
            .await
            .unwrap();

        let raw = fs::read_to_string(store.path()).await.unwrap();
        assert!(raw.starts_with("{\n  \"alice\": {\n    \"603\": {"));
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_item() {
        let store = temp_store("overwrite");
        store
            .upsert_record("alice", submission("1399", "tv", 10))
            .await
            .unwrap();
        store
            .upsert_record("alice", submission("1399", "tv", 20))
            .await
            .unwrap();

        let items = store.get_all_for_user("alice").await;
        assert_eq!(items.len(), 1);
        let record = items["1399"].as_progress().expect("typed record");
        assert_eq!(record.timestamp.as_u64(), Some(20));
    }

    #[tokio::test]
    async fn delete_reports_not_found_then_deleted() {
        let store = temp_store("delete");
        assert_eq!(
            store.delete_record("alice", "603").await.unwrap(),
            DeleteOutcome::NotFound
        );

        store
            .upsert_record("alice", submission("603", "movie", 1))
            .await
            .unwrap();
        assert_eq!(
            store.delete_record("alice", "603").await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert!(store.get_record("alice", "603").await.is_none());
        assert_eq!(
            store.delete_record("alice", "603").await.unwrap(),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_user_both_survive() {
        let store = Arc::new(temp_store("concurrent"));
        let first = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .upsert_record("alice", submission("603", "movie", 1))
                    .await
            })
        };
        let second = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .upsert_record("alice", submission("27205", "movie", 2))
                    .await
            })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let items = store.get_all_for_user("alice").await;
        assert!(items.contains_key("603"));
        assert!(items.contains_key("27205"));
    }

    #[tokio::test]
    async fn failed_save_is_reported() {
        let store = temp_store("unwritable");
        let parent = store.path().parent().unwrap().to_path_buf();
        fs::create_dir_all(parent.parent().unwrap()).await.unwrap();
        // A plain file where the data directory should be blocks create_dir_all.
        fs::write(&parent, b"").await.unwrap();

        let result = store
            .upsert_record("alice", submission("603", "movie", 1))
            .await;
        assert!(result.is_err());
        assert!(store.get_record("alice", "603").await.is_none());
    }

    #[tokio::test]
    async fn upsert_keeps_records_of_other_shapes() {
        let store = temp_store("lenient");
        fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        let seeded = json!({
            "alice": { "603": { "mediaType": "movie", "timestamp": "12:30", "lastUpdated": 1 } },
            "carol": { "27205": { "mediaType": "movie", "timestamp": 5, "lastUpdated": 2 } }
        });
        fs::write(store.path(), serde_json::to_vec_pretty(&seeded).unwrap())
            .await
            .unwrap();

        store
            .upsert_record("bob", submission("9", "tv", 3))
            .await
            .unwrap();

        let raw = fs::read(store.path()).await.unwrap();
        let on_disk: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(on_disk["alice"], seeded["alice"]);
        assert_eq!(on_disk["carol"], seeded["carol"]);
        assert_eq!(on_disk["bob"]["9"]["mediaType"], "tv");

        let alice = store.get_record("alice", "603").await.expect("alice kept");
        assert!(alice.as_progress().is_none());
    }

    #[tokio::test]
    async fn malformed_file_is_moved_aside_before_rewrite() {
        let store = temp_store("set_aside");
        let dir = store.path().parent().unwrap().to_path_buf();
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(store.path(), b"{ not json").await.unwrap();

        store
            .upsert_record("alice", submission("603", "movie", 1))
            .await
            .unwrap();

        let mut entries = fs::read_dir(&dir).await.unwrap();
        let mut set_aside = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("progress.json.corrupt-") {
                set_aside.push(entry.path());
            }
        }
        assert_eq!(set_aside.len(), 1);
        assert_eq!(fs::read(&set_aside[0]).await.unwrap(), b"{ not json");
        assert!(store.get_record("alice", "603").await.is_some());
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let store = temp_store("rename");
        // A non-empty directory at the data path makes the final rename fail.
        fs::create_dir_all(store.path().join("occupied")).await.unwrap();

        let result = store.save(&ProgressDocument::default()).await;
        assert!(result.is_err());
        assert!(!fs::try_exists(store.path().with_extension("json.tmp"))
            .await
            .unwrap());
    }
}
