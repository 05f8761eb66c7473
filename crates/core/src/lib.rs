//! Storybook Core
//!
//! The engine behind the sentence-by-sentence storybook builder: a retrying
//! fetch client shared by the two remote generation services, the adapters that
//! turn their replies into verdicts and illustrations, and the state machine that
//! walks a learner through the story's sentence tasks.

pub mod credential;
pub mod fetch;
pub mod illustration;
mod markup;
pub mod placeholder;
pub mod story;
pub mod storybook;
pub mod transcript;
pub mod validation;
pub mod workflow;

pub use credential::Credential;
pub use fetch::{FetchError, RetryPolicy, RetryingClient};
pub use illustration::{Illustration, IllustrationAdapter, ImageGenerator};
pub use story::{SentenceTask, StoryConfig};
pub use transcript::{Speaker, StoryPage, TranscriptEntry};
pub use validation::{SentenceCheck, SentenceJudge, ValidationAdapter, Verdict};
pub use workflow::{StoryWorkflow, SubmitOutcome, Transition, WorkflowError, WorkflowPhase};
