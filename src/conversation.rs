//! Conversation history

use crate::llm::{LlmMessage, MessageRole};
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Separator between turns in the history pane
const DISPLAY_RULE: &str = "-------------------";

/// One message in the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: MessageRole,
    text: String,
    created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: MessageRole, text: String) -> Self {
        Self {
            role,
            text,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Speaker label used in transcripts
    pub fn speaker(&self) -> &'static str {
        match self.role() {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
        }
    }

    pub fn to_message(&self) -> LlmMessage {
        match self.role() {
            MessageRole::User => LlmMessage::user(self.text.clone()),
            MessageRole::Assistant => LlmMessage::assistant(self.text.clone()),
        }
    }
}

/// Append-only turn history.
///
/// Alternation of roles is the orchestrator's job; a user turn may be left
/// without a reply when its completion failed.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub(crate) fn append(&mut self, role: MessageRole, text: impl Into<String>) {
        self.turns.push(Turn::new(role, text.into()));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Text of the newest assistant turn
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == MessageRole::Assistant)
            .map(Turn::text)
    }

    /// Oldest-first messages for a completion request
    pub fn messages(&self) -> Vec<LlmMessage> {
        self.turns.iter().map(Turn::to_message).collect()
    }

    /// `Speaker: text` lines, oldest first
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let _ = writeln!(out, "{}: {}", turn.speaker(), turn.text);
        }
        out
    }

    /// Transcript with a rule under every turn, for the history pane
    pub fn display(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            let _ = writeln!(out, "{}: {}", turn.speaker(), turn.text);
            let _ = writeln!(out, "{DISPLAY_RULE}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_last_assistant_text_ignores_trailing_user_turn() {
        let mut history = ConversationHistory::default();
        assert_eq!(history.last_assistant_text(), None);

        history.append(MessageRole::User, "Hi");
        history.append(MessageRole::Assistant, "Welcome to the symposium.");
        history.append(MessageRole::User, "Follow-up?");

        assert_eq!(history.last_assistant_text(), Some("Welcome to the symposium."));
    }

    #[test]
    fn test_transcript_and_display() {
        let mut history = ConversationHistory::default();
        history.append(MessageRole::User, "What is your research about?");
        history.append(MessageRole::Assistant, "Quantum ML.");

        assert_eq!(
            history.transcript(),
            "User: What is your research about?\nAssistant: Quantum ML.\n"
        );
        assert_eq!(
            history.display(),
            "User: What is your research about?\n-------------------\nAssistant: Quantum ML.\n-------------------\n"
        );
    }

    #[test]
    fn test_messages_map_roles() {
        let mut history = ConversationHistory::default();
        history.append(MessageRole::User, "a");
        history.append(MessageRole::Assistant, "b");

        assert_eq!(
            history.messages(),
            vec![LlmMessage::user("a"), LlmMessage::assistant("b")]
        );
    }

    proptest! {
        #[test]
        fn prop_append_preserves_order(texts in proptest::collection::vec("[a-zA-Z0-9 ?.]{0,40}", 0..30)) {
            let mut history = ConversationHistory::default();
            for (i, text) in texts.iter().enumerate() {
                let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
                history.append(role, text.clone());
            }

            prop_assert_eq!(history.len(), texts.len());
            let stored: Vec<&str> = history.turns().iter().map(Turn::text).collect();
            let expected: Vec<&str> = texts.iter().map(String::as_str).collect();
            prop_assert_eq!(stored, expected);
        }
    }
}
