//! Resolution verification
//!
//! After every professor reply a separate, stateless judge request decides
//! whether the conversation has reached a satisfactory conclusion. The judge
//! never sees itself as part of the role-play: it gets the event, the
//! transcript and the latest reply as plain context in a single message.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService};
use crate::persona::PersonaConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const JUDGE_PROMPT: &str = r"You are a verification system analyzing if an academic event's conflict or discussion has reached a positive conclusion.

ANALYSIS CRITERIA:
1. Has the main concern/question been fully addressed?
2. Did the professor provide a satisfactory explanation or solution?
3. Is there a clear sense of understanding between all parties?
4. Has the conversation reached a natural, positive conclusion?
5. Are there any unresolved issues or remaining concerns?

RESPONSE RULES:
- Respond ONLY with 'yes' if ALL of the following are true:
  * The main topic/concern has been fully addressed
  * The conversation has reached a clear, positive conclusion
  * No significant questions remain unanswered
  * The interaction ends on a constructive note

- Respond with 'no' if ANY of the following are true:
  * The main topic/concern remains partially or fully unaddressed
  * There are outstanding questions or concerns
  * The conversation feels incomplete or unresolved
  * The interaction needs further discussion

Respond with ONLY 'yes' or 'no'.";

pub const DEFAULT_JUDGE_TIMEOUT: Duration = Duration::from_secs(30);

/// How judge output is turned into a verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerdictMode {
    /// Resolved when the lower-cased text contains "yes" anywhere.
    /// Misreads answers like "No, yes-or-no aside, ..." as resolved.
    #[default]
    Contains,
    /// Resolved only when the first word is exactly "yes"
    Strict,
}

/// Derive the verdict from raw judge text
pub fn parse_verdict(text: &str, mode: VerdictMode) -> bool {
    let normalized = text.trim().to_lowercase();
    match mode {
        VerdictMode::Contains => normalized.contains("yes"),
        VerdictMode::Strict => normalized
            .split(|c: char| !c.is_alphanumeric())
            .find(|word| !word.is_empty())
            .is_some_and(|word| word == "yes"),
    }
}

/// Judge request settings
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub verdict_mode: VerdictMode,
}

impl JudgeSettings {
    /// Default timeout and substring verdicts
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            timeout: DEFAULT_JUDGE_TIMEOUT,
            verdict_mode: VerdictMode::default(),
        }
    }
}

/// State of the conversation as of one turn, as handed to the judge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationInput {
    /// Number of turns in the history when the snapshot was taken
    pub turn_count: usize,
    pub transcript: String,
    pub most_recent: Option<String>,
    /// Creation time of the newest turn in the snapshot
    pub as_of: Option<DateTime<Utc>>,
}

/// Why a verification attempt produced no verdict
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("no assistant response to verify")]
    NoResponseToVerify,
    #[error("judge request failed: {0}")]
    Failed(#[from] LlmError),
    #[error("judge request timed out after {0:?}")]
    TimedOut(Duration),
    #[error("judge returned no text")]
    EmptyVerdict,
}

/// Builds judge requests and interprets their answers
#[derive(Debug, Clone)]
pub struct ResolutionVerifier {
    settings: JudgeSettings,
    event_description: String,
    event_details: String,
}

impl ResolutionVerifier {
    pub fn new(settings: JudgeSettings, persona: &PersonaConfig) -> Self {
        Self {
            settings,
            event_description: persona.event_description.clone(),
            event_details: persona.event_details.clone(),
        }
    }

    /// Fresh single-message judge request for one snapshot
    pub fn build_request(&self, transcript: &str, most_recent: &str) -> LlmRequest {
        let content = format!(
            "Event Context:\n{}\n{}\n\nConversation History:\n{transcript}\n\nMost Recent Response:\n{most_recent}",
            self.event_description, self.event_details
        );

        LlmRequest::new(self.settings.model.clone(), self.settings.max_tokens)
            .with_system(JUDGE_PROMPT)
            .with_message(LlmMessage::user(content))
    }

    /// Ask the judge about a snapshot.
    ///
    /// Returns the verdict, or why none could be reached. Callers treat every
    /// error as "not resolved yet".
    pub async fn judge<L>(&self, llm: &L, input: &VerificationInput) -> Result<bool, VerificationError>
    where
        L: LlmService + ?Sized,
    {
        let most_recent = input
            .most_recent
            .as_deref()
            .filter(|text| !text.is_empty())
            .ok_or(VerificationError::NoResponseToVerify)?;

        let request = self.build_request(&input.transcript, most_recent);

        let response = timeout(self.settings.timeout, llm.complete(&request))
            .await
            .map_err(|_| VerificationError::TimedOut(self.settings.timeout))??;

        let text = response.first_text().ok_or(VerificationError::EmptyVerdict)?;
        let resolved = parse_verdict(text, self.settings.verdict_mode);

        tracing::debug!(
            turn_count = input.turn_count,
            verdict = %text.trim(),
            resolved,
            "Judge answered"
        );

        Ok(resolved)
    }
}
