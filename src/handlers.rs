use crate::errors::AppError;
use crate::identity::Caller;
use crate::models::{
    DeleteProgressResponse, ProgressSubmission, SaveProgressResponse, StoredRecord, UserProgress,
};
use crate::state::AppState;
use crate::storage::DeleteOutcome;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};

const WELCOME: &str =
    "Welcome to the Episode Tracker API! Please use the frontend HTML application to interact.";

pub async fn index() -> &'static str {
    WELCOME
}

pub async fn get_all_progress(
    State(state): State<AppState>,
    caller: Caller,
) -> Json<UserProgress> {
    Json(state.store.get_all_for_user(caller.storage_key()).await)
}

pub async fn save_progress(
    State(state): State<AppState>,
    caller: Caller,
    body: Bytes,
) -> Result<Json<SaveProgressResponse>, AppError> {
    // Unparseable bodies fall through to the missing-fields error.
    let submission: ProgressSubmission = serde_json::from_slice(&body).unwrap_or_default();
    let Some(submission) = submission.validate() else {
        return Err(AppError::bad_request(
            "Missing required fields: tmdbId, mediaType, timestamp",
        ));
    };

    let progress = state
        .store
        .upsert_record(caller.storage_key(), submission)
        .await?;

    Ok(Json(SaveProgressResponse {
        status: "success".to_string(),
        progress,
    }))
}

pub async fn get_progress(
    State(state): State<AppState>,
    caller: Caller,
    Path(tmdb_id): Path<String>,
) -> Json<Option<StoredRecord>> {
    Json(state.store.get_record(caller.storage_key(), &tmdb_id).await)
}

pub async fn delete_progress(
    State(state): State<AppState>,
    caller: Caller,
    Path(tmdb_id): Path<String>,
) -> Result<Json<DeleteProgressResponse>, AppError> {
    match state
        .store
        .delete_record(caller.storage_key(), &tmdb_id)
        .await?
    {
        DeleteOutcome::Deleted => Ok(Json(DeleteProgressResponse {
            status: "success".to_string(),
            message: "Progress deleted successfully.".to_string(),
        })),
        DeleteOutcome::NotFound => Err(AppError::not_found("Progress not found for this item.")),
    }
}
