//! Per-session state and its guards

use crate::conversation::{ConversationHistory, Turn};
use crate::llm::MessageRole;
use crate::persona::{build_context, PersonaConfig};
use crate::verifier::VerificationInput;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable part of a session
#[derive(Debug, Default)]
pub struct SessionState {
    history: ConversationHistory,
    resolved: bool,
}

impl SessionState {
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Newest professor reply
    pub fn most_recent(&self) -> Option<&str> {
        self.history.last_assistant_text()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn record_user_turn(&mut self, text: &str) {
        self.history.append(MessageRole::User, text);
    }

    fn record_assistant_turn(&mut self, text: &str) {
        self.history.append(MessageRole::Assistant, text);
    }

    /// Returns true only on the unresolved -> resolved transition
    fn mark_resolved(&mut self) -> bool {
        !std::mem::replace(&mut self.resolved, true)
    }

    /// What the judge should see for the state as it is now
    pub fn snapshot(&self) -> VerificationInput {
        VerificationInput {
            turn_count: self.history.len(),
            transcript: self.history.transcript(),
            most_recent: self.most_recent().map(str::to_string),
            as_of: self.history.turns().last().map(Turn::created_at),
        }
    }
}

/// One conversation with one persona.
///
/// History and flags live behind an async mutex that is never held across a
/// completion call. Every mutation first checks that the session is still
/// live, so a completion that finishes after teardown changes nothing.
pub struct Session {
    id: Uuid,
    persona: PersonaConfig,
    context: String,
    state: Mutex<SessionState>,
    turn_in_flight: AtomicBool,
    verify_lock: Mutex<()>,
    closed: CancellationToken,
}

impl Session {
    pub fn new(persona: PersonaConfig) -> Self {
        let context = build_context(&persona);
        Self {
            id: Uuid::new_v4(),
            persona,
            context,
            state: Mutex::new(SessionState::default()),
            turn_in_flight: AtomicBool::new(false),
            verify_lock: Mutex::new(()),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Persona system prompt, rendered once at session start
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_live(&self) -> bool {
        !self.closed.is_cancelled()
    }

    pub fn close(&self) {
        if self.is_live() {
            tracing::info!(session_id = %self.id, "Closing session");
        }
        self.closed.cancel();
    }

    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub async fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    /// Claim the single turn slot, or `None` when a turn is already running
    pub(crate) fn begin_turn(&self) -> Option<TurnGuard<'_>> {
        self.turn_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TurnGuard {
                flag: &self.turn_in_flight,
            })
    }

    /// Serializes verification for this session
    pub(crate) async fn lock_verification(&self) -> MutexGuard<'_, ()> {
        self.verify_lock.lock().await
    }

    /// Record a user turn. Returns the request messages, or `None` if the
    /// session is no longer live.
    pub(crate) async fn record_user_turn(&self, text: &str) -> Option<Vec<crate::llm::LlmMessage>> {
        let mut state = self.state.lock().await;
        if !self.is_live() {
            return None;
        }
        state.record_user_turn(text);
        Some(state.history.messages())
    }

    /// Record the professor's reply. Returns the snapshot for verification of
    /// this turn, or `None` if the session is no longer live.
    pub(crate) async fn record_assistant_turn(&self, text: &str) -> Option<VerificationInput> {
        let mut state = self.state.lock().await;
        if !self.is_live() {
            tracing::debug!(session_id = %self.id, "Dropping reply for closed session");
            return None;
        }
        state.record_assistant_turn(text);
        Some(state.snapshot())
    }

    /// Set the resolved flag. True only when this call flipped it.
    pub(crate) async fn mark_resolved(&self) -> bool {
        let mut state = self.state.lock().await;
        if !self.is_live() {
            return false;
        }
        state.mark_resolved()
    }
}

/// Releases the turn slot on drop
pub(crate) struct TurnGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
