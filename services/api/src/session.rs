//! Story session endpoints
//!
//! These drive the single in-process [`StoryWorkflow`](storybook_core::StoryWorkflow).
//! Mutating calls take the workflow lock with `try_lock`, so a request that
//! arrives while a submission is still running gets a 409 rather than queueing.
//! Starting and submitting run on their own task holding the lock, so they finish
//! even when the client goes away.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use storybook_core::{
    StoryWorkflow, WorkflowError, WorkflowPhase, storybook::STORYBOOK_MIME_TYPE,
};
use tokio::sync::{MutexGuard, OwnedMutexGuard};
use tracing::info;

use crate::{
    handlers::{ApiError, non_blank},
    models::{
        AppendWordPayload, ErrorResponse, StorySnapshot, SubmitSentencePayload,
        SubmitSentenceResponse,
    },
    state::AppState,
};

fn busy() -> ApiError {
    ApiError::Conflict("Another request is still being processed".to_string())
}

fn try_lock(state: &AppState) -> Result<MutexGuard<'_, StoryWorkflow>, ApiError> {
    state.workflow.try_lock().map_err(|_| busy())
}

fn try_lock_owned(state: &AppState) -> Result<OwnedMutexGuard<StoryWorkflow>, ApiError> {
    state.workflow.clone().try_lock_owned().map_err(|_| busy())
}

/// Current state of the story.
#[utoipa::path(
    get,
    path = "/story",
    responses(
        (status = 200, description = "Story snapshot", body = StorySnapshot)
    )
)]
pub async fn get_story(State(state): State<Arc<AppState>>) -> Json<StorySnapshot> {
    let workflow = state.workflow.lock().await;
    Json(StorySnapshot::from(&*workflow))
}

/// Greet the learner and open the first task.
#[utoipa::path(
    post,
    path = "/story/start",
    responses(
        (status = 200, description = "Story started", body = StorySnapshot),
        (status = 409, description = "The story has already started or is busy", body = ErrorResponse)
    )
)]
pub async fn start_story(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StorySnapshot>, ApiError> {
    let mut workflow = try_lock_owned(&state)?;
    if workflow.phase() != WorkflowPhase::Welcome {
        return Err(ApiError::Conflict(format!(
            "The story can only be started from welcome (currently {})",
            workflow.phase()
        )));
    }

    let snapshot = tokio::spawn(async move {
        workflow.start().await?;
        Ok::<_, WorkflowError>(StorySnapshot::from(&*workflow))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(snapshot))
}

/// Submit a sentence for the current task.
#[utoipa::path(
    post,
    path = "/story/sentences",
    request_body = SubmitSentencePayload,
    responses(
        (status = 200, description = "What happened to the sentence", body = SubmitSentenceResponse),
        (status = 400, description = "Missing sentence or malformed body", body = ErrorResponse),
        (status = 409, description = "Another submission is in flight", body = ErrorResponse)
    )
)]
pub async fn submit_sentence(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitSentencePayload>, JsonRejection>,
) -> Result<Json<SubmitSentenceResponse>, ApiError> {
    let Json(payload) = payload?;
    // Short and blank sentences are the workflow's to handle.
    let sentence = payload
        .sentence
        .ok_or_else(|| ApiError::BadRequest("Missing sentence parameter".to_string()))?;

    let mut workflow = try_lock_owned(&state)?;
    let response = tokio::spawn(async move {
        let outcome = workflow.submit(&sentence).await?;
        Ok::<_, WorkflowError>(SubmitSentenceResponse {
            outcome,
            snapshot: StorySnapshot::from(&*workflow),
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(response))
}

/// Append a word-bank word to the pending input.
#[utoipa::path(
    post,
    path = "/story/words",
    request_body = AppendWordPayload,
    responses(
        (status = 200, description = "Word appended", body = StorySnapshot),
        (status = 400, description = "Missing word or malformed body", body = ErrorResponse),
        (status = 409, description = "Input is closed in the current phase", body = ErrorResponse)
    )
)]
pub async fn append_word(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AppendWordPayload>, JsonRejection>,
) -> Result<Json<StorySnapshot>, ApiError> {
    let Json(payload) = payload?;
    let word = non_blank(payload.word)
        .ok_or_else(|| ApiError::BadRequest("Missing word parameter".to_string()))?;

    let mut workflow = try_lock(&state)?;
    workflow.append_word(&word)?;
    Ok(Json(StorySnapshot::from(&*workflow)))
}

/// Discard the transcript and pages and go back to the welcome screen.
#[utoipa::path(
    post,
    path = "/story/reset",
    responses(
        (status = 200, description = "Story reset", body = StorySnapshot),
        (status = 409, description = "A submission is in flight", body = ErrorResponse)
    )
)]
pub async fn reset_story(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StorySnapshot>, ApiError> {
    let mut workflow = try_lock(&state)?;
    workflow.reset()?;
    Ok(Json(StorySnapshot::from(&*workflow)))
}

/// Download the finished story as a standalone HTML file.
#[utoipa::path(
    get,
    path = "/story/download",
    responses(
        (status = 200, description = "HTML storybook", content_type = "text/html", body = String),
        (status = 409, description = "The story is not complete", body = ErrorResponse)
    )
)]
pub async fn download_storybook(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut workflow = try_lock(&state)?;
    let storybook = workflow.export_storybook()?;
    info!(
        session_id = %workflow.session_id(),
        bytes = storybook.html.len(),
        "Serving storybook download"
    );

    Ok((
        [
            (header::CONTENT_TYPE, STORYBOOK_MIME_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", storybook.file_name),
            ),
        ],
        storybook.html,
    ))
}
