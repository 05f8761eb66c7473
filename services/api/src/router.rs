//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the proxy endpoints, the story session endpoints, and the
//! OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AppendWordPayload, ErrorResponse, GenerateImagePayload, GenerateImageResponse, PageView,
        StorySnapshot, SubmitSentencePayload, SubmitSentenceResponse, TaskView,
        TranscriptEntryView, ValidateSentencePayload, ValidateSentenceResponse,
    },
    session,
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::validate_sentence,
        handlers::generate_image,
        session::get_story,
        session::start_story,
        session::submit_sentence,
        session::append_word,
        session::reset_story,
        session::download_storybook,
    ),
    components(
        schemas(
            ValidateSentencePayload, ValidateSentenceResponse, GenerateImagePayload,
            GenerateImageResponse, SubmitSentencePayload, SubmitSentenceResponse,
            AppendWordPayload, StorySnapshot, TaskView, TranscriptEntryView, PageView,
            ErrorResponse
        )
    ),
    tags(
        (name = "Storybook API", description = "Sentence-by-sentence storybook building with generated illustrations")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route(
            "/validate-sentence",
            post(handlers::validate_sentence).fallback(handlers::method_not_allowed),
        )
        .route(
            "/generate-image",
            post(handlers::generate_image).fallback(handlers::method_not_allowed),
        )
        .route("/story", get(session::get_story))
        .route("/story/start", post(session::start_story))
        .route("/story/sentences", post(session::submit_sentence))
        .route("/story/words", post(session::append_word))
        .route("/story/reset", post(session::reset_story))
        .route("/story/download", get(session::download_storybook))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
