//! Runtime for driving one role-played conversation
//!
//! A user turn is appended, completed against the persona context and full
//! history, and the reply is shown. Each successful turn enqueues a snapshot
//! for a per-session verification task, so the judge never delays the reply
//! and judgments run strictly one after another in turn order.

mod session;
pub mod traits;

#[cfg(test)]
pub mod testing;

use session::Session;
pub use traits::PresentationSink;

use crate::conversation::ConversationHistory;
use crate::llm::{LlmError, LlmRequest, LlmService};
use crate::persona::PersonaConfig;
use crate::verifier::{JudgeSettings, ResolutionVerifier, VerificationError, VerificationInput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Model settings for both channels
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub model: String,
    pub max_tokens: u32,
    pub judge: JudgeSettings,
}

/// Why a user turn produced no reply
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("user input is empty")]
    EmptyInput,
    #[error("a turn is already in progress for this session")]
    ConcurrentTurn,
    #[error("session is not initialized or has been closed")]
    NotInitialized,
    #[error("completion failed ({}): {}", .0.kind, .0.message)]
    Completion(#[from] LlmError),
}

/// Everything the turn path and the verification task share
struct Shared<L, P> {
    session: Session,
    llm: L,
    sink: P,
    verifier: ResolutionVerifier,
}

impl<L, P> Shared<L, P>
where
    L: LlmService,
    P: PresentationSink,
{
    /// Judge one snapshot. Caller holds the session's verification lock.
    async fn verify_locked(&self, input: &VerificationInput) -> bool {
        let session_id = self.session.id();
        let resolved = match self.verifier.judge(&self.llm, input).await {
            Ok(resolved) => resolved,
            Err(VerificationError::NoResponseToVerify) => {
                tracing::warn!(session_id = %session_id, "No response to verify");
                false
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Verification failed");
                false
            }
        };

        tracing::info!(
            session_id = %session_id,
            turns = input.turn_count,
            as_of = ?input.as_of,
            resolved,
            "Event resolution checked"
        );

        if resolved && self.session.mark_resolved().await {
            tracing::info!(session_id = %session_id, "Event resolved, continuation unlocked");
            self.sink.on_resolved().await;
        }

        resolved
    }
}

/// Drives one session: user turns in, professor replies and the resolved
/// signal out.
///
/// Must be created inside a tokio runtime; it spawns the session's
/// verification task. Dropping the runtime tears the session down.
pub struct ConversationRuntime<L, P>
where
    L: LlmService + 'static,
    P: PresentationSink + 'static,
{
    shared: Arc<Shared<L, P>>,
    model: String,
    max_tokens: u32,
    verify_tx: mpsc::UnboundedSender<VerificationInput>,
    enqueued: AtomicU64,
    verified_rx: watch::Receiver<u64>,
}

impl<L, P> ConversationRuntime<L, P>
where
    L: LlmService + 'static,
    P: PresentationSink + 'static,
{
    pub fn new(persona: PersonaConfig, settings: RuntimeSettings, llm: L, sink: P) -> Self {
        let verifier = ResolutionVerifier::new(settings.judge, &persona);
        let shared = Arc::new(Shared {
            session: Session::new(persona),
            llm,
            sink,
            verifier,
        });

        let (verify_tx, verify_rx) = mpsc::unbounded_channel();
        let (verified_tx, verified_rx) = watch::channel(0);
        tokio::spawn(run_verification(Arc::clone(&shared), verify_rx, verified_tx));

        tracing::info!(
            session_id = %shared.session.id(),
            persona = %shared.session.persona().name,
            model = %settings.model,
            "Session started"
        );

        Self {
            shared,
            model: settings.model,
            max_tokens: settings.max_tokens,
            verify_tx,
            enqueued: AtomicU64::new(0),
            verified_rx,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session.id()
    }

    pub fn persona(&self) -> &PersonaConfig {
        self.shared.session.persona()
    }

    /// Persona system prompt used for every turn of this session
    pub fn context(&self) -> &str {
        self.shared.session.context()
    }

    pub async fn history(&self) -> ConversationHistory {
        self.shared.session.state().await.history().clone()
    }

    pub async fn is_resolved(&self) -> bool {
        self.shared.session.state().await.is_resolved()
    }

    /// Send one user message and return the professor's reply.
    ///
    /// The user turn stays in history even if the completion fails. A
    /// failure is also shown through the sink so the user sees it.
    pub async fn submit_user_turn(&self, text: &str) -> Result<String, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let session = &self.shared.session;
        if !session.is_live() {
            return Err(TurnError::NotInitialized);
        }
        let Some(_turn) = session.begin_turn() else {
            tracing::warn!(session_id = %session.id(), "Rejected overlapping turn");
            return Err(TurnError::ConcurrentTurn);
        };

        let messages = session
            .record_user_turn(text)
            .await
            .ok_or(TurnError::NotInitialized)?;

        let request = LlmRequest::new(self.model.clone(), self.max_tokens)
            .with_system(session.context())
            .with_messages(messages);

        let result = tokio::select! {
            () = session.closed().cancelled() => {
                tracing::info!(session_id = %session.id(), "Abandoned pending completion");
                return Err(TurnError::NotInitialized);
            }
            result = self.shared.llm.complete(&request) => result,
        };

        let reply = match result.and_then(|response| {
            response
                .first_text()
                .map(str::to_string)
                .ok_or_else(|| LlmError::malformed("Response contained no text"))
        }) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    session_id = %session.id(),
                    kind = %e.kind,
                    error = %e.message,
                    "Turn failed"
                );
                self.shared
                    .sink
                    .on_assistant_text(&format!("Error occurred: {}", e.message))
                    .await;
                return Err(TurnError::Completion(e));
            }
        };

        let snapshot = session
            .record_assistant_turn(&reply)
            .await
            .ok_or(TurnError::NotInitialized)?;

        tracing::info!(
            session_id = %session.id(),
            turns = snapshot.turn_count,
            "Turn completed"
        );

        // Shown before it is judged, so `on_resolved` never precedes the reply
        self.shared.sink.on_assistant_text(&reply).await;
        self.enqueue_verification(snapshot);

        Ok(reply)
    }

    fn enqueue_verification(&self, snapshot: VerificationInput) {
        if self.verify_tx.send(snapshot).is_ok() {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
        } else {
            tracing::debug!(session_id = %self.session_id(), "Verification task gone, skipping");
        }
    }

    /// Judge the conversation as it stands now.
    ///
    /// Runs under the same lock as the queued verifications, so it never
    /// overlaps with one. Any failure reads as "not resolved".
    pub async fn verify_resolution(&self) -> bool {
        let _verifying = self.shared.session.lock_verification().await;
        let snapshot = self.shared.session.state().await.snapshot();
        self.shared.verify_locked(&snapshot).await
    }

    /// Wait until every verification enqueued so far has been judged, or
    /// the session has been closed.
    pub async fn wait_for_verifications(&self) {
        let target = self.enqueued.load(Ordering::SeqCst);
        let mut verified = self.verified_rx.clone();
        let _ = verified.wait_for(|done| *done >= target).await;
    }

    /// Tear the session down. A pending completion is abandoned and nothing
    /// is recorded afterwards.
    pub fn close(&self) {
        self.shared.session.close();
    }
}

impl<L, P> Drop for ConversationRuntime<L, P>
where
    L: LlmService + 'static,
    P: PresentationSink + 'static,
{
    fn drop(&mut self) {
        self.shared.session.close();
    }
}

/// Per-session verification task. Drains snapshots in turn order.
async fn run_verification<L, P>(
    shared: Arc<Shared<L, P>>,
    mut verify_rx: mpsc::UnboundedReceiver<VerificationInput>,
    verified_tx: watch::Sender<u64>,
) where
    L: LlmService,
    P: PresentationSink,
{
    let session_id = shared.session.id();
    loop {
        tokio::select! {
            () = shared.session.closed().cancelled() => break,
            next = verify_rx.recv() => {
                let Some(snapshot) = next else { break };
                {
                    let _verifying = shared.session.lock_verification().await;
                    shared.verify_locked(&snapshot).await;
                }
                verified_tx.send_modify(|done| *done += 1);
            }
        }
    }
    tracing::debug!(session_id = %session_id, "Verification task stopped");
}
