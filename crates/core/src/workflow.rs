//! Task Progression State Machine
//!
//! [`StoryWorkflow`] owns one learner's session: the current [`WorkflowPhase`],
//! the transcript, the finished pages and the pending input. Every phase change
//! goes through [`WorkflowPhase::apply`], so a transition that is not in the
//! table is rejected rather than silently taken.
//!
//! The two remote calls of a task run strictly one after the other, and all
//! mutating methods take `&mut self`; a second submission cannot start while one
//! is in flight. If a submission future is dropped mid-call, the next mutating
//! call finds a busy phase with nothing running and returns it to `building`.

use crate::{
    illustration::IllustrationAdapter,
    story::{SentenceTask, StoryConfig},
    storybook::{Storybook, render_storybook},
    transcript::{StoryLog, StoryPage, TranscriptEntry},
    validation::{SentenceCheck, ValidationAdapter},
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Sentences shorter than this (in characters, after trimming) never reach the validator.
pub const MIN_SENTENCE_CHARS: usize = 5;

const INSTRUCTIONS: &str = "You can use words from the **word bank** below, or type your own words. Remember: **capitalization and punctuation are important!** Let's start!";
const SENTENCE_TOO_SHORT: &str = "Please type a full sentence that says something meaningful! 😉";
const CHECKING_SENTENCE: &str = "Checking your sentence... Please wait for my feedback. 🧐";
const PAGE_READY: &str = "Wonderful! 🖼️ This page is ready for your story book!";
const STORY_COMPLETE: &str = "🎉 The story is complete! You did a fantastic job! Check your story book and click **'Download Story Book'** to save it! 📖";
const DOWNLOAD_STARTED: &str = "✅ Your story book download has started! Save your file and share your story! 🌟";

fn greeting(title: &str) -> String {
    format!(
        "Hello! I'm your Story Book Creator! 📚 We're going to build a story about **'{}'** together.",
        title
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Welcome,
    Building,
    Validating,
    GeneratingIllustration,
    Complete,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowPhase::Welcome => "welcome",
            WorkflowPhase::Building => "building",
            WorkflowPhase::Validating => "validating",
            WorkflowPhase::GeneratingIllustration => "generating_illustration",
            WorkflowPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// The events that move the workflow between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Begin,
    SentenceTooShort,
    Submit,
    Reject,
    Accept,
    PageAdded { more_tasks: bool },
    /// A remote call was abandoned before it finished.
    Abandon,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Cannot apply {transition:?} while {from}")]
    IllegalTransition {
        from: WorkflowPhase,
        transition: Transition,
    },
    #[error("Input can only be edited while building a sentence (currently {0})")]
    InputClosed(WorkflowPhase),
    #[error("The storybook is only available once every page is complete")]
    StoryIncomplete,
}

impl WorkflowPhase {
    /// The transition table. Anything not listed is illegal.
    pub fn apply(self, transition: Transition) -> Result<Self, WorkflowError> {
        use Transition::*;
        use WorkflowPhase::*;

        match (self, transition) {
            (Welcome, Begin) => Ok(Building),
            (Building, SentenceTooShort) => Ok(Building),
            (Building, Submit) => Ok(Validating),
            (Validating, Reject) => Ok(Building),
            (Validating, Accept) => Ok(GeneratingIllustration),
            (GeneratingIllustration, PageAdded { more_tasks: true }) => Ok(Building),
            (GeneratingIllustration, PageAdded { more_tasks: false }) => Ok(Complete),
            (Validating | GeneratingIllustration, Abandon) => Ok(Building),
            (Welcome | Building | Complete, Reset) => Ok(Welcome),
            (from, transition) => Err(WorkflowError::IllegalTransition { from, transition }),
        }
    }

    pub fn accepts_input(self) -> bool {
        self == WorkflowPhase::Building
    }

    /// True while a remote call is in flight.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            WorkflowPhase::Validating | WorkflowPhase::GeneratingIllustration
        )
    }
}

/// What happened to a submitted sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SubmitOutcome {
    /// Dropped because the workflow was not waiting for a sentence.
    Ignored { phase: WorkflowPhase },
    TooShort,
    Rejected { feedback: String },
    PageAdded { page_number: usize, complete: bool },
}

pub struct StoryWorkflow {
    session_id: Uuid,
    story: Arc<StoryConfig>,
    validator: ValidationAdapter,
    illustrator: IllustrationAdapter,
    phase: WorkflowPhase,
    log: StoryLog,
    pending_input: String,
}

impl StoryWorkflow {
    pub fn new(
        story: Arc<StoryConfig>,
        validator: ValidationAdapter,
        illustrator: IllustrationAdapter,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            story,
            validator,
            illustrator,
            phase: WorkflowPhase::Welcome,
            log: StoryLog::new(),
            pending_input: String::new(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn story(&self) -> &StoryConfig {
        &self.story
    }

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    /// Index of the task being worked on; equal to the number of finished pages.
    pub fn task_index(&self) -> usize {
        self.log.pages().len()
    }

    pub fn total_tasks(&self) -> usize {
        self.story.tasks.len()
    }

    pub fn current_task(&self) -> Option<&SentenceTask> {
        self.story.task(self.task_index())
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.log.entries()
    }

    pub fn pages(&self) -> &[StoryPage] {
        self.log.pages()
    }

    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    /// Word bank for the current task; empty once the story is finished.
    pub fn allowed_words(&self) -> Vec<String> {
        self.current_task()
            .map(|task| self.story.allowed_words(task))
            .unwrap_or_default()
    }

    fn advance(&mut self, transition: Transition) -> Result<(), WorkflowError> {
        let next = self.phase.apply(transition)?;
        debug!(from = %self.phase, to = %next, ?transition, "Phase transition");
        self.phase = next;
        Ok(())
    }

    /// `&mut self` rules out a call still running, so a busy phase here means
    /// the previous submission was dropped before it finished.
    fn recover_abandoned(&mut self) {
        if self.phase.is_busy() {
            warn!(
                phase = %self.phase,
                "Previous submission was abandoned mid-call; reopening the task"
            );
            // Legal from every busy phase.
            let _ = self.advance(Transition::Abandon);
        }
    }

    fn announce_current_task(&mut self) {
        if let Some(announcement) = self.current_task().map(SentenceTask::announcement) {
            self.log.narrate(announcement);
        }
    }

    /// Waits the presentation delay, then greets the learner and opens the first task.
    ///
    /// Nothing is mutated before the delay elapses, so dropping the future early
    /// leaves the workflow exactly as it was.
    #[instrument(name = "start_story", skip_all, fields(session_id = %self.session_id))]
    pub async fn start(&mut self) -> Result<(), WorkflowError> {
        self.phase.apply(Transition::Begin)?;

        let delay = self.story.intro_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.log.narrate(greeting(&self.story.title));
        self.log.narrate(INSTRUCTIONS);
        self.advance(Transition::Begin)?;
        self.announce_current_task();
        info!(total_tasks = self.total_tasks(), "Story started");
        Ok(())
    }

    /// Runs one sentence through validation and, when accepted, illustration.
    #[instrument(
        name = "submit_sentence",
        skip_all,
        fields(session_id = %self.session_id, task_index = self.task_index())
    )]
    pub async fn submit(&mut self, text: &str) -> Result<SubmitOutcome, WorkflowError> {
        self.recover_abandoned();
        if !self.phase.accepts_input() {
            debug!(phase = %self.phase, "Dropping submission");
            return Ok(SubmitOutcome::Ignored { phase: self.phase });
        }
        let Some(task) = self.current_task().cloned() else {
            return Ok(SubmitOutcome::Ignored { phase: self.phase });
        };

        self.pending_input = text.to_string();
        let sentence = text.trim().to_string();

        if sentence.chars().count() < MIN_SENTENCE_CHARS {
            self.log.narrate(SENTENCE_TOO_SHORT);
            self.advance(Transition::SentenceTooShort)?;
            return Ok(SubmitOutcome::TooShort);
        }

        self.log.learner(sentence.as_str());
        self.log.narrate(CHECKING_SENTENCE);
        self.advance(Transition::Submit)?;

        let check = SentenceCheck::new(
            sentence.as_str(),
            task.instruction.as_str(),
            self.story.context.as_str(),
        );
        let verdict = self.validator.validate(&check).await;

        if !verdict.accepted {
            info!(task_id = task.id, "Sentence needs another try");
            self.log.narrate(verdict.feedback.as_str());
            self.advance(Transition::Reject)?;
            return Ok(SubmitOutcome::Rejected {
                feedback: verdict.feedback,
            });
        }

        self.log.narrate(task.success_message.as_str());
        self.advance(Transition::Accept)?;

        let prompt = task.image_prompt(&sentence);
        let illustration = self.illustrator.illustrate(&prompt).await;

        self.log.push_page(StoryPage {
            task_id: task.id,
            sentence,
            illustration,
            prompt,
        });
        self.log.narrate(PAGE_READY);
        self.pending_input.clear();

        let page_number = self.log.pages().len();
        let more_tasks = self.current_task().is_some();
        self.advance(Transition::PageAdded { more_tasks })?;
        info!(task_id = task.id, page_number, "Story page added");

        if more_tasks {
            self.announce_current_task();
        } else {
            self.log.narrate(STORY_COMPLETE);
            info!(pages = page_number, "Story complete");
        }

        Ok(SubmitOutcome::PageAdded {
            page_number,
            complete: !more_tasks,
        })
    }

    /// Replaces the pending input.
    pub fn set_input(&mut self, text: &str) -> Result<(), WorkflowError> {
        self.recover_abandoned();
        if !self.phase.accepts_input() {
            return Err(WorkflowError::InputClosed(self.phase));
        }
        self.pending_input = text.to_string();
        Ok(())
    }

    /// Appends a word-bank word to the pending input, separated by one space.
    pub fn append_word(&mut self, word: &str) -> Result<(), WorkflowError> {
        self.recover_abandoned();
        if !self.phase.accepts_input() {
            return Err(WorkflowError::InputClosed(self.phase));
        }
        let current = self.pending_input.trim();
        self.pending_input = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        Ok(())
    }

    /// Renders the finished storybook and notes the download in the transcript.
    pub fn export_storybook(&mut self) -> Result<Storybook, WorkflowError> {
        if self.phase != WorkflowPhase::Complete {
            return Err(WorkflowError::StoryIncomplete);
        }
        let storybook = render_storybook(&self.story, self.log.pages());
        self.log.narrate(DOWNLOAD_STARTED);
        info!(file_name = %storybook.file_name, "Storybook exported");
        Ok(storybook)
    }

    /// Clears transcript, pages and input, and returns to `welcome`.
    pub fn reset(&mut self) -> Result<(), WorkflowError> {
        self.recover_abandoned();
        self.advance(Transition::Reset)?;
        self.log.clear();
        self.pending_input.clear();
        let previous = std::mem::replace(&mut self.session_id, Uuid::new_v4());
        info!(previous_session = %previous, session_id = %self.session_id, "Story reset");
        Ok(())
    }
}
