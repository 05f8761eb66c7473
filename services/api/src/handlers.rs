//! Axum Handlers for the proxy endpoints
//!
//! `/validate-sentence` and `/generate-image` forward a single request to the
//! remote generation services, keeping the API key on the server. They are
//! documented with `utoipa` path annotations.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use storybook_core::{
    FetchError, SentenceCheck, WorkflowError, validation::RETRY_FEEDBACK,
};
use tracing::{error, info, warn};

use crate::{
    models::{
        ErrorResponse, GenerateImagePayload, GenerateImageResponse, ValidateSentencePayload,
        ValidateSentenceResponse,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    /// The generation API key is not set.
    Unconfigured,
    MethodNotAllowed,
    /// A background task failed before producing a response.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Unconfigured => {
                error!("Generation request rejected: API key not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "API key not configured".to_string(),
                )
            }
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
            ),
            ApiError::Internal(reason) => {
                error!(reason = %reason, "Internal Server Error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self::Conflict(err.to_string())
    }
}

/// Returns the trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fallback for the POST-only routes.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Judge one sentence against its task and the story context.
#[utoipa::path(
    post,
    path = "/validate-sentence",
    request_body = ValidateSentencePayload,
    responses(
        (status = 200, description = "The service reached a verdict", body = ValidateSentenceResponse),
        (status = 400, description = "Missing parameters or malformed body", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 500, description = "API key not configured, or the check could not be carried out", body = ValidateSentenceResponse)
    )
)]
pub async fn validate_sentence(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateSentencePayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let (Some(sentence), Some(task_instruction), Some(story_context)) = (
        non_blank(payload.sentence),
        non_blank(payload.task_instruction),
        non_blank(payload.story_context),
    ) else {
        return Err(ApiError::BadRequest(
            "Missing required parameters".to_string(),
        ));
    };

    if !state.credential.is_configured() {
        return Err(ApiError::Unconfigured);
    }

    let check = SentenceCheck::new(sentence, task_instruction, story_context);
    match state.judge.judge(&check).await {
        Ok(verdict) => {
            info!(accepted = verdict.accepted, "Sentence judged");
            Ok(Json(ValidateSentenceResponse {
                should_proceed: verdict.accepted,
                feedback: verdict.feedback,
            })
            .into_response())
        }
        Err(FetchError::MissingCredential(_)) => Err(ApiError::Unconfigured),
        Err(e) => {
            warn!(error = %e, "Sentence validation failed");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ValidateSentenceResponse {
                    should_proceed: false,
                    feedback: RETRY_FEEDBACK.to_string(),
                }),
            )
                .into_response())
        }
    }
}

/// Generate one illustration for a prompt.
#[utoipa::path(
    post,
    path = "/generate-image",
    request_body = GenerateImagePayload,
    responses(
        (status = 200, description = "A data URL, or null when the caller should draw a placeholder", body = GenerateImageResponse),
        (status = 400, description = "Missing prompt or malformed body", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 500, description = "API key not configured", body = ErrorResponse)
    )
)]
pub async fn generate_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateImagePayload>, JsonRejection>,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let Json(payload) = payload?;
    let prompt = non_blank(payload.prompt)
        .ok_or_else(|| ApiError::BadRequest("Missing prompt parameter".to_string()))?;

    if !state.credential.is_configured() {
        return Err(ApiError::Unconfigured);
    }

    let image_url = match state.generator.generate(&prompt).await {
        Ok(image) if !image.is_empty() => Some(image.to_data_url()),
        Ok(_) => {
            warn!("Image service returned an empty image");
            None
        }
        Err(FetchError::MissingCredential(_)) => return Err(ApiError::Unconfigured),
        Err(e) => {
            warn!(error = %e, "Image generation failed; caller will use a placeholder");
            None
        }
    };

    Ok(Json(GenerateImageResponse { image_url }))
}
