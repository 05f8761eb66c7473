//! Validation Service Adapter
//!
//! A [`SentenceJudge`] asks a remote language model whether a learner's sentence
//! is grammatical and consistent with the story. The model answers with one of
//! four tags; [`parse_verdict`] maps that reply to a [`Verdict`].
//! [`ValidationAdapter`] wraps a judge so that every failure becomes a gentle
//! "please try again" verdict instead of an error.

use crate::{
    credential::Credential,
    fetch::{FetchError, RequestDescriptor, RetryingClient},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const SERVICE_NAME: &str = "gemini";

/// Feedback shown whenever a sentence could not be checked.
pub const RETRY_FEEDBACK: &str = "Something went wrong with the check. Please try again or fix your capitalization and context.";

/// The outcome tags the model is instructed to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictTag {
    Proceed,
    FixGrammar,
    FixContext,
    FixBoth,
}

impl VerdictTag {
    pub const ALL: [VerdictTag; 4] = [
        VerdictTag::Proceed,
        VerdictTag::FixGrammar,
        VerdictTag::FixContext,
        VerdictTag::FixBoth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VerdictTag::Proceed => "PROCEED",
            VerdictTag::FixGrammar => "FIX_GRAMMAR",
            VerdictTag::FixContext => "FIX_CONTEXT",
            VerdictTag::FixBoth => "FIX_BOTH",
        }
    }
}

/// Pass/fail plus the hint to show the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    pub feedback: String,
}

impl Verdict {
    /// The degraded verdict used when the check itself could not be carried out.
    pub fn retry_prompt() -> Self {
        Self {
            accepted: false,
            feedback: RETRY_FEEDBACK.to_string(),
        }
    }
}

/// Everything needed to judge one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceCheck {
    pub sentence: String,
    pub task_instruction: String,
    pub story_context: String,
}

impl SentenceCheck {
    pub fn new(
        sentence: impl Into<String>,
        task_instruction: impl Into<String>,
        story_context: impl Into<String>,
    ) -> Self {
        Self {
            sentence: sentence.into(),
            task_instruction: task_instruction.into(),
            story_context: story_context.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        [&self.sentence, &self.task_instruction, &self.story_context]
            .iter()
            .all(|field| !field.trim().is_empty())
    }
}

/// Maps a tagged model reply to a verdict.
///
/// Only a reply starting with `PROCEED` is accepted. A recognized leading tag and
/// its colon are stripped from the feedback; anything else is passed through.
pub fn parse_verdict(reply: &str) -> Verdict {
    let reply = reply.trim();
    let accepted = reply.starts_with(VerdictTag::Proceed.as_str());
    let feedback = VerdictTag::ALL
        .iter()
        .find_map(|tag| reply.strip_prefix(tag.as_str())?.strip_prefix(':'))
        .map(str::trim_start)
        .unwrap_or(reply);

    Verdict {
        accepted,
        feedback: feedback.to_string(),
    }
}

/// Builds the single evaluation prompt sent to the model.
pub fn build_evaluation_prompt(check: &SentenceCheck) -> String {
    format!(
        r#"You are a friendly teacher for young primary school learners. Evaluate this sentence: "{sentence}"

Task: {task}

Story context: {context}

STRICT RULES:
- NEVER give the learner the correct sentence, and NEVER quote a full passage of the story context as the fix. Only give short, encouraging hints.
- Your ENTIRE reply MUST be the structured format below, with no greeting or explanation before or after it.
- REJECT sentences that contradict the story (if the story says "Rina is a student", then "Rina is a bird" is wrong).
- REJECT sentences that do not answer what the task asks for.
- REJECT sentences with grammar errors (missing capital letter, missing full stop, wrong word forms).

Check these two things IN THIS ORDER:
1. GRAMMAR: Is it a complete sentence that starts with a capital letter and ends with a full stop?
2. FACTS: Is the sentence true according to the story, and does it answer the task?

Reply with EXACTLY one of:
- "{proceed}: [brief praise]" when grammar and facts are both correct
- "{grammar}: [hint about capital letters or punctuation]" when only the grammar is wrong
- "{context_tag}: [hint about what the story says or what the task asked]" when only the facts are wrong
- "{both}: [brief hints for both]" when both are wrong

Be encouraging, but never approve a wrong sentence."#,
        sentence = check.sentence,
        task = check.task_instruction,
        context = check.story_context.trim(),
        proceed = VerdictTag::Proceed.as_str(),
        grammar = VerdictTag::FixGrammar.as_str(),
        context_tag = VerdictTag::FixContext.as_str(),
        both = VerdictTag::FixBoth.as_str(),
    )
}

/// A remote sentence-checking capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentenceJudge: Send + Sync {
    /// Judges one sentence. A reply with no usable text yields [`Verdict::retry_prompt`];
    /// failing to reach the model at all is an error.
    async fn judge(&self, check: &SentenceCheck) -> Result<Verdict, FetchError>;
}

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    fn reply_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .filter(|t| !t.trim().is_empty())
    }
}

/// `SentenceJudge` for the Gemini `:generateContent` endpoint.
pub struct GeminiJudge {
    client: RetryingClient,
    api_base: String,
    model: String,
    credential: Credential,
}

impl GeminiJudge {
    pub fn new(
        client: RetryingClient,
        api_base: impl Into<String>,
        model: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            model: model.into(),
            credential,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl SentenceJudge for GeminiJudge {
    async fn judge(&self, check: &SentenceCheck) -> Result<Verdict, FetchError> {
        let api_key = self.credential.resolve()?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(build_evaluation_prompt(check)),
                }],
            }],
        };
        let request = RequestDescriptor::post_json(self.endpoint(), &body)?
            .header("x-goog-api-key", api_key);

        let response: GenerateContentResponse = self.client.call(SERVICE_NAME, &request).await?;
        match response.reply_text() {
            Some(reply) => {
                debug!(reply = %reply, "Sentence judged");
                Ok(parse_verdict(&reply))
            }
            None => {
                warn!("Validation reply carried no text");
                Ok(Verdict::retry_prompt())
            }
        }
    }
}

/// Wraps a judge so callers always receive a verdict.
#[derive(Clone)]
pub struct ValidationAdapter {
    judge: Arc<dyn SentenceJudge>,
}

impl ValidationAdapter {
    pub fn new(judge: Arc<dyn SentenceJudge>) -> Self {
        Self { judge }
    }

    pub async fn validate(&self, check: &SentenceCheck) -> Verdict {
        if !check.is_complete() {
            warn!("Sentence check is missing a field; skipping the remote call");
            return Verdict::retry_prompt();
        }
        match self.judge.judge(check).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "Sentence check failed; asking the learner to retry");
                Verdict::retry_prompt()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{MockTransport, RawResponse, RetryPolicy};
    use reqwest::StatusCode;

    fn check() -> SentenceCheck {
        SentenceCheck::new(
            "Rina is a student.",
            "Build Sentence 1: Tell us about Rina.",
            "Rina is a Year 2 student. She loves animals.",
        )
    }

    fn judge(transport: MockTransport) -> GeminiJudge {
        GeminiJudge::new(
            RetryingClient::new(Arc::new(transport), RetryPolicy::default()),
            "https://generativelanguage.test/v1beta",
            "gemini-2.5-flash",
            Credential::Static("test-key".to_string()),
        )
    }

    fn reply(text: &str) -> RawResponse {
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        });
        RawResponse::new(StatusCode::OK, body.to_string())
    }

    #[test]
    fn test_parse_proceed() {
        let verdict = parse_verdict("PROCEED: Great job!");
        assert!(verdict.accepted);
        assert_eq!(verdict.feedback, "Great job!");
    }

    #[test]
    fn test_parse_fix_tags() {
        for (reply, feedback) in [
            ("FIX_GRAMMAR: Start with a capital letter.", "Start with a capital letter."),
            ("FIX_CONTEXT: Is Rina really a bird?", "Is Rina really a bird?"),
            ("FIX_BOTH: check capitals and facts", "check capitals and facts"),
        ] {
            let verdict = parse_verdict(reply);
            assert!(!verdict.accepted, "{} should be rejected", reply);
            assert_eq!(verdict.feedback, feedback);
        }
    }

    #[test]
    fn test_parse_untagged_reply_is_rejected_verbatim() {
        let verdict = parse_verdict("  Looks fine to me.  ");
        assert!(!verdict.accepted);
        assert_eq!(verdict.feedback, "Looks fine to me.");
    }

    #[test]
    fn test_parse_tag_without_colon_keeps_text() {
        let verdict = parse_verdict("PROCEED well done");
        assert!(verdict.accepted);
        assert_eq!(verdict.feedback, "PROCEED well done");
    }

    #[test]
    fn test_prompt_mentions_inputs_tags_and_rules() {
        let prompt = build_evaluation_prompt(&check());
        assert!(prompt.contains("\"Rina is a student.\""));
        assert!(prompt.contains("Task: Build Sentence 1: Tell us about Rina."));
        assert!(prompt.contains("Story context: Rina is a Year 2 student."));
        for tag in VerdictTag::ALL {
            assert!(prompt.contains(tag.as_str()), "missing {}", tag.as_str());
        }
        assert!(prompt.contains("NEVER give the learner the correct sentence"));
        let grammar = prompt.find("1. GRAMMAR").unwrap();
        let facts = prompt.find("2. FACTS").unwrap();
        assert!(grammar < facts);
    }

    #[tokio::test]
    async fn test_gemini_judge_request_and_verdict() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|req| {
                req.endpoint
                    == "https://generativelanguage.test/v1beta/models/gemini-2.5-flash:generateContent"
                    && req.header_value("x-goog-api-key") == Some("test-key")
                    && !req.endpoint.contains("test-key")
                    && req.payload["contents"][0]["parts"][0]["text"]
                        .as_str()
                        .is_some_and(|t| t.contains("Rina is a student."))
            })
            .times(1)
            .returning(|_| Ok(reply("PROCEED: Great job!")));

        let verdict = judge(transport).judge(&check()).await.unwrap();
        assert_eq!(
            verdict,
            Verdict {
                accepted: true,
                feedback: "Great job!".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_gemini_judge_missing_text_is_retry_prompt() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(RawResponse::new(StatusCode::OK, r#"{"candidates":[]}"#)));

        let verdict = judge(transport).judge(&check()).await.unwrap();
        assert_eq!(verdict, Verdict::retry_prompt());
    }

    #[tokio::test]
    async fn test_gemini_judge_terminal_status_is_error() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(RawResponse::new(StatusCode::FORBIDDEN, "")));

        let err = judge(transport).judge(&check()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_adapter_degrades_errors_to_retry_prompt() {
        let mut judge = MockSentenceJudge::new();
        judge.expect_judge().times(1).returning(|_| {
            Err(FetchError::Exhausted {
                service: "gemini".to_string(),
                attempts: 3,
                last_failure: "status 503".to_string(),
            })
        });

        let verdict = ValidationAdapter::new(Arc::new(judge))
            .validate(&check())
            .await;
        assert_eq!(verdict, Verdict::retry_prompt());
    }

    #[tokio::test]
    async fn test_adapter_skips_remote_call_for_incomplete_check() {
        let mut judge = MockSentenceJudge::new();
        judge.expect_judge().never();

        let adapter = ValidationAdapter::new(Arc::new(judge));
        let verdict = adapter
            .validate(&SentenceCheck::new("Rina is a student.", "", "context"))
            .await;
        assert_eq!(verdict, Verdict::retry_prompt());
    }

    #[tokio::test]
    async fn test_adapter_passes_verdict_through() {
        let mut judge = MockSentenceJudge::new();
        judge
            .expect_judge()
            .withf(|c| c.sentence == "rina is a bird")
            .returning(|_| Ok(parse_verdict("FIX_BOTH: check capitals and facts")));

        let verdict = ValidationAdapter::new(Arc::new(judge))
            .validate(&SentenceCheck::new("rina is a bird", "task", "context"))
            .await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.feedback, "check capitals and facts");
    }
}
