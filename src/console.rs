//! Terminal front end: a typewriter sink and the line-oriented loop

use crate::llm::LlmService;
use crate::runtime::{ConversationRuntime, PresentationSink, TurnError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const RESOLVED_BANNER: &str =
    "[The professor's question has been resolved. Type /continue to move on.]";

/// Sink that reveals professor text one character at a time.
///
/// Output goes through a single lock, so the resolved banner never lands in
/// the middle of a reply that is still being revealed.
pub struct ConsoleSink<W> {
    out: Mutex<W>,
    delay: Duration,
}

impl<W> ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(out: W, delay: Duration) -> Self {
        Self {
            out: Mutex::new(out),
            delay,
        }
    }

    /// Write a plain line, no reveal
    pub async fn print_line(&self, line: &str) {
        let mut out = self.out.lock().await;
        if let Err(e) = write_line(&mut *out, line).await {
            tracing::warn!(error = %e, "Console write failed");
        }
    }

    async fn reveal(&self, text: &str) -> std::io::Result<()> {
        let mut out = self.out.lock().await;
        if self.delay.is_zero() {
            return write_line(&mut *out, text).await;
        }
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            out.write_all(ch.encode_utf8(&mut buf).as_bytes()).await?;
            out.flush().await?;
            tokio::time::sleep(self.delay).await;
        }
        write_line(&mut *out, "").await
    }

    #[cfg(test)]
    pub async fn written(&self) -> W
    where
        W: Clone,
    {
        self.out.lock().await.clone()
    }
}

async fn write_line<W: AsyncWrite + Unpin>(out: &mut W, line: &str) -> std::io::Result<()> {
    out.write_all(line.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

#[async_trait]
impl<W> PresentationSink for ConsoleSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn on_assistant_text(&self, text: &str) {
        if let Err(e) = self.reveal(text).await {
            tracing::warn!(error = %e, "Console write failed");
        }
    }

    async fn on_resolved(&self) {
        self.print_line(RESOLVED_BANNER).await;
    }
}

/// How the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplExit {
    Quit,
    Continued,
    EndOfInput,
}

/// Read lines until `/quit`, end of input, or an accepted `/continue`.
///
/// `/history` prints the transcript and `/continue` first waits for pending
/// judgments. Other lines are sent as user turns; turn errors are logged and
/// the loop keeps going.
pub async fn run_repl<L, S, W, R>(
    runtime: &ConversationRuntime<L, S>,
    console: &ConsoleSink<W>,
    input: R,
) -> std::io::Result<ReplExit>
where
    L: LlmService + 'static,
    S: PresentationSink + 'static,
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => return Ok(ReplExit::Quit),
            "/history" => {
                let history = runtime.history().await;
                if history.is_empty() {
                    console.print_line("[No conversation yet.]").await;
                } else {
                    console.print_line(history.display().trim_end()).await;
                }
            }
            "/continue" => {
                runtime.wait_for_verifications().await;
                if runtime.is_resolved().await {
                    return Ok(ReplExit::Continued);
                }
                console
                    .print_line("[Keep talking; the professor's question is not settled yet.]")
                    .await;
            }
            text => match runtime.submit_user_turn(text).await {
                Ok(_) | Err(TurnError::EmptyInput) => {}
                Err(e) => tracing::warn!(session_id = %runtime.session_id(), error = %e, "Turn not completed"),
            },
        }
    }
    Ok(ReplExit::EndOfInput)
}
