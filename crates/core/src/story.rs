//! Story Configuration
//!
//! The story context and the ordered list of sentence tasks are read-only for
//! the life of a workflow. They are bundled into a [`StoryConfig`] and injected
//! into the state machine, so alternate task sets can be loaded from JSON.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, path::Path, time::Duration};

/// Placeholder substituted with the learner's sentence in image prompt templates.
pub const SENTENCE_PLACEHOLDER: &str = "{sentence}";

const DEFAULT_INTRO_DELAY_MS: u64 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum StoryConfigError {
    #[error("Failed to read story file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse story file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Story must contain at least one sentence task")]
    NoTasks,
    #[error("Task ids must be strictly increasing, found {next} after {previous}")]
    UnorderedIds { previous: u32, next: u32 },
    #[error("Image prompt template of task {0} has no {{sentence}} placeholder")]
    MissingPlaceholder(u32),
}

/// Suggested words for a task, grouped by part of speech.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordChoices {
    #[serde(default)]
    pub naming: Vec<String>,
    #[serde(default)]
    pub describing: Vec<String>,
    #[serde(default)]
    pub action: Vec<String>,
}

impl WordChoices {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.naming
            .iter()
            .chain(&self.describing)
            .chain(&self.action)
            .map(String::as_str)
    }
}

/// One required sentence of the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceTask {
    pub id: u32,
    pub instruction: String,
    pub hint: String,
    #[serde(default)]
    pub word_choices: WordChoices,
    pub image_prompt_template: String,
    pub success_message: String,
}

impl SentenceTask {
    /// The illustration prompt with `sentence` substituted for the placeholder.
    pub fn image_prompt(&self, sentence: &str) -> String {
        self.image_prompt_template
            .replacen(SENTENCE_PLACEHOLDER, sentence, 1)
    }

    /// The narrator message that opens this task.
    pub fn announcement(&self) -> String {
        format!("{} 📝\n\n*HINT*: {}", self.instruction, self.hint)
    }
}

/// The fixed story a session is built around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryConfig {
    pub title: String,
    /// The source of truth every sentence is checked against.
    pub context: String,
    pub tasks: Vec<SentenceTask>,
    #[serde(default = "default_helper_words")]
    pub helper_words: Vec<String>,
    #[serde(default = "default_intro_delay_ms")]
    pub intro_delay_ms: u64,
}

fn default_helper_words() -> Vec<String> {
    ["a", "an", "the", "and", "but", "so"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_intro_delay_ms() -> u64 {
    DEFAULT_INTRO_DELAY_MS
}

impl StoryConfig {
    /// Loads and validates a story from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, StoryConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, StoryConfigError> {
        let story: StoryConfig = serde_json::from_str(raw)?;
        story.validate()?;
        Ok(story)
    }

    /// Checks the invariants the workflow relies on.
    pub fn validate(&self) -> Result<(), StoryConfigError> {
        if self.tasks.is_empty() {
            return Err(StoryConfigError::NoTasks);
        }
        for pair in self.tasks.windows(2) {
            if pair[1].id <= pair[0].id {
                return Err(StoryConfigError::UnorderedIds {
                    previous: pair[0].id,
                    next: pair[1].id,
                });
            }
        }
        if let Some(task) = self
            .tasks
            .iter()
            .find(|t| !t.image_prompt_template.contains(SENTENCE_PLACEHOLDER))
        {
            return Err(StoryConfigError::MissingPlaceholder(task.id));
        }
        Ok(())
    }

    pub fn with_intro_delay(mut self, delay: Duration) -> Self {
        self.intro_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn intro_delay(&self) -> Duration {
        Duration::from_millis(self.intro_delay_ms)
    }

    pub fn task(&self, index: usize) -> Option<&SentenceTask> {
        self.tasks.get(index)
    }

    /// Word bank for a task: its word choices plus the helper words, deduplicated and sorted.
    pub fn allowed_words(&self, task: &SentenceTask) -> Vec<String> {
        task.word_choices
            .iter()
            .chain(self.helper_words.iter().map(String::as_str))
            .map(String::from)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// File name offered when the storybook is downloaded.
    pub fn storybook_file_name(&self) -> String {
        let stem: String = self
            .title
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_Story_Book.html", stem)
    }

    /// "The Kind Helper", the built-in three-sentence story.
    pub fn kind_helper() -> Self {
        Self {
            title: "The Kind Helper".to_string(),
            context: KIND_HELPER_CONTEXT.trim().to_string(),
            tasks: vec![
                SentenceTask {
                    id: 1,
                    instruction: "Build Sentence 1: Tell us about Rina.".to_string(),
                    hint: "Your sentence must start with a capital letter and end with a period. Use a Naming Word, an Action Word, and maybe a Describing Word!".to_string(),
                    word_choices: words(&["Rina", "student", "bird"], &["kind", "brave", "happy"], &["is", "helps", "sees"]),
                    image_prompt_template: "Full-colour, child-friendly cartoon of {sentence}. Malaysian primary school setting, Year 2 student, bright and cheerful, age-appropriate style, 3D render.".to_string(),
                    success_message: "Wonderful sentence! Let me create a picture for you... ✨".to_string(),
                },
                SentenceTask {
                    id: 2,
                    instruction: "Build Sentence 2: Tell us about the bird.".to_string(),
                    hint: "Remember capitalization and punctuation! How does the bird look or what does it have?".to_string(),
                    word_choices: words(&["bird", "wing", "garden"], &["small", "blue", "sad"], &["looks", "has", "is"]),
                    image_prompt_template: "Full-colour, child-friendly cartoon of {sentence}. School garden setting, Malaysian primary school environment, gentle and caring mood, age-appropriate style, 3D render.".to_string(),
                    success_message: "Beautiful sentence! Creating your picture... 🎨".to_string(),
                },
                SentenceTask {
                    id: 3,
                    instruction: "Build Sentence 3: Tell us what happened.".to_string(),
                    hint: "Action words are important here! What did Rina do and how did the bird feel after?".to_string(),
                    word_choices: words(&["Rina", "bird", "water"], &["happy", "kind", "little"], &["gives", "helps", "smiles"]),
                    image_prompt_template: "Full-colour, child-friendly cartoon of {sentence}. Malaysian primary school garden, showing caring interaction between girl and bird, happy and positive mood, age-appropriate style, 3D render.".to_string(),
                    success_message: "Perfect sentence! Making your final picture... 🌟".to_string(),
                },
            ],
            helper_words: default_helper_words(),
            intro_delay_ms: DEFAULT_INTRO_DELAY_MS,
        }
    }
}

const KIND_HELPER_CONTEXT: &str = r#"
Rina is a Year 2 student. She loves animals.
One day, Rina sees a small bird in the school garden.
The bird has a blue wing. It looks sad.
Rina says, "Are you hurt, little bird?"
She gives the bird some water. The bird drinks.
The bird looks happy now!
Rina smiles. She says, "You are a brave bird!"
"#;

fn words(naming: &[&str], describing: &[&str], action: &[&str]) -> WordChoices {
    let owned = |list: &[&str]| -> Vec<String> { list.iter().map(|w| w.to_string()).collect() };
    WordChoices {
        naming: owned(naming),
        describing: owned(describing),
        action: owned(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_helper_is_valid() {
        let story = StoryConfig::kind_helper();
        story.validate().expect("built-in story should be valid");
        assert_eq!(story.tasks.len(), 3);
        assert_eq!(
            story.tasks.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(story.context.starts_with("Rina is a Year 2 student."));
        assert_eq!(story.intro_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn test_image_prompt_substitutes_sentence_once() {
        let task = &StoryConfig::kind_helper().tasks[0];
        let prompt = task.image_prompt("Rina is a student.");
        assert!(prompt.starts_with("Full-colour, child-friendly cartoon of Rina is a student.."));
        assert!(!prompt.contains(SENTENCE_PLACEHOLDER));
    }

    #[test]
    fn test_announcement_contains_instruction_and_hint() {
        let task = &StoryConfig::kind_helper().tasks[1];
        let text = task.announcement();
        assert!(text.starts_with("Build Sentence 2: Tell us about the bird."));
        assert!(text.contains("*HINT*: Remember capitalization"));
    }

    #[test]
    fn test_allowed_words_are_deduplicated_and_sorted() {
        let story = StoryConfig::kind_helper();
        let words = story.allowed_words(&story.tasks[0]);
        assert_eq!(
            words,
            vec![
                "Rina", "a", "an", "and", "bird", "brave", "but", "happy", "helps", "is", "kind",
                "sees", "so", "student", "the"
            ]
        );
    }

    #[test]
    fn test_storybook_file_name() {
        assert_eq!(
            StoryConfig::kind_helper().storybook_file_name(),
            "The_Kind_Helper_Story_Book.html"
        );
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let raw = r#"{
            "title": "Short",
            "context": "A cat sits.",
            "tasks": [{
                "id": 1,
                "instruction": "Tell us about the cat.",
                "hint": "Use a capital letter.",
                "imagePromptTemplate": "Cartoon of {sentence}",
                "successMessage": "Nice!"
            }]
        }"#;
        let story = StoryConfig::from_json_str(raw).unwrap();
        assert_eq!(story.helper_words.len(), 6);
        assert_eq!(story.intro_delay_ms, 2000);
        assert!(story.tasks[0].word_choices.iter().next().is_none());
    }

    #[test]
    fn test_validate_rejects_empty_story() {
        let mut story = StoryConfig::kind_helper();
        story.tasks.clear();
        assert!(matches!(story.validate(), Err(StoryConfigError::NoTasks)));
    }

    #[test]
    fn test_validate_rejects_unordered_ids() {
        let mut story = StoryConfig::kind_helper();
        story.tasks[2].id = 2;
        match story.validate() {
            Err(StoryConfigError::UnorderedIds { previous, next }) => {
                assert_eq!((previous, next), (2, 2))
            }
            other => panic!("Expected UnorderedIds, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut story = StoryConfig::kind_helper();
        story.tasks[1].image_prompt_template = "A bird.".to_string();
        assert!(matches!(
            story.validate(),
            Err(StoryConfigError::MissingPlaceholder(2))
        ));
    }
}
