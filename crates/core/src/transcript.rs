//! Transcript and page accumulator.
//!
//! Both collections only grow. The single way to shrink them is
//! [`StoryLog::clear`], which the workflow calls as part of a reset.

use crate::illustration::Illustration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who a transcript entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Narrator,
    Learner,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Narrator => write!(f, "narrator"),
            Speaker::Learner => write!(f, "learner"),
        }
    }
}

/// One chat-log item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    /// Position in the transcript, starting at zero.
    pub index: usize,
    pub speaker: Speaker,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A validated, illustrated sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryPage {
    pub task_id: u32,
    pub sentence: String,
    pub illustration: Illustration,
    /// The exact prompt the illustration was requested with.
    pub prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct StoryLog {
    entries: Vec<TranscriptEntry>,
    pages: Vec<StoryPage>,
}

impl StoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrate(&mut self, text: impl Into<String>) -> &TranscriptEntry {
        self.push_entry(Speaker::Narrator, text.into())
    }

    pub fn learner(&mut self, text: impl Into<String>) -> &TranscriptEntry {
        self.push_entry(Speaker::Learner, text.into())
    }

    fn push_entry(&mut self, speaker: Speaker, text: String) -> &TranscriptEntry {
        let index = self.entries.len();
        self.entries.push(TranscriptEntry {
            index,
            speaker,
            text,
            created_at: Utc::now(),
        });
        &self.entries[index]
    }

    pub fn push_page(&mut self, page: StoryPage) {
        self.pages.push(page);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn pages(&self) -> &[StoryPage] {
        &self.pages
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pages.clear();
    }
}
