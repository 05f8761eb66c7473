//! API Models
//!
//! Request and response bodies for the proxy and story endpoints, annotated for
//! OpenAPI generation with `utoipa`. Request fields are optional so a missing
//! field is reported as a 400 by the handler rather than a deserialization failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storybook_core::{StoryPage, StoryWorkflow, SubmitOutcome, TranscriptEntry};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Deserialize, ToSchema, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSentencePayload {
    #[schema(example = "Rina is a student.")]
    pub sentence: Option<String>,
    #[schema(example = "Build Sentence 1: Tell us about Rina.")]
    pub task_instruction: Option<String>,
    pub story_context: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSentenceResponse {
    pub should_proceed: bool,
    #[schema(example = "Great job!")]
    pub feedback: String,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct GenerateImagePayload {
    #[schema(example = "Full-colour, child-friendly cartoon of a small bird with a blue wing.")]
    pub prompt: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    /// A `data:` URL, or `null` when the caller should draw its own placeholder.
    pub image_url: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct SubmitSentencePayload {
    #[schema(example = "Rina is a student.")]
    pub sentence: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct AppendWordPayload {
    #[schema(example = "student")]
    pub word: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: u32,
    pub instruction: String,
    pub hint: String,
    pub allowed_words: Vec<String>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntryView {
    pub index: usize,
    #[schema(example = "narrator")]
    pub speaker: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<&TranscriptEntry> for TranscriptEntryView {
    fn from(entry: &TranscriptEntry) -> Self {
        Self {
            index: entry.index,
            speaker: entry.speaker.to_string(),
            text: entry.text.clone(),
            created_at: entry.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page_number: usize,
    pub task_id: u32,
    pub sentence: String,
    pub image_url: String,
    pub prompt: String,
}

impl PageView {
    fn new(page_number: usize, page: &StoryPage) -> Self {
        Self {
            page_number,
            task_id: page.task_id,
            sentence: page.sentence.clone(),
            image_url: page.illustration.to_data_url(),
            prompt: page.prompt.clone(),
        }
    }
}

/// Everything a client needs to render the current state of the story.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StorySnapshot {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub title: String,
    #[schema(value_type = String, example = "building")]
    pub phase: String,
    pub task_index: usize,
    pub total_tasks: usize,
    pub current_task: Option<TaskView>,
    pub pending_input: String,
    pub transcript: Vec<TranscriptEntryView>,
    pub pages: Vec<PageView>,
}

impl From<&StoryWorkflow> for StorySnapshot {
    fn from(workflow: &StoryWorkflow) -> Self {
        let current_task = workflow.current_task().map(|task| TaskView {
            id: task.id,
            instruction: task.instruction.clone(),
            hint: task.hint.clone(),
            allowed_words: workflow.allowed_words(),
        });

        Self {
            session_id: workflow.session_id(),
            title: workflow.story().title.clone(),
            phase: workflow.phase().to_string(),
            task_index: workflow.task_index(),
            total_tasks: workflow.total_tasks(),
            current_task,
            pending_input: workflow.pending_input().to_string(),
            transcript: workflow.transcript().iter().map(Into::into).collect(),
            pages: workflow
                .pages()
                .iter()
                .enumerate()
                .map(|(i, page)| PageView::new(i + 1, page))
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct SubmitSentenceResponse {
    /// Tagged by `kind`: `ignored`, `too_short`, `rejected` or `page_added`.
    #[schema(value_type = Object)]
    pub outcome: SubmitOutcome,
    pub snapshot: StorySnapshot,
}
