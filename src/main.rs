//! Symposium - role-played faculty conversations
//!
//! Talk with an LLM-played professor about a campus event. An independent
//! judge watches each reply and unlocks `/continue` once the professor's
//! concern has been fully addressed.

mod config;
mod console;
mod conversation;
mod llm;
mod persona;
mod runtime;
mod verifier;

use config::AppConfig;
use console::{run_repl, ConsoleSink, ReplExit};
use llm::{AnthropicService, LoggingService};
use runtime::ConversationRuntime;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "symposium=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = AppConfig::from_env()?;
    let persona = config.persona()?;

    let anthropic = AnthropicService::new(config.api_key.clone(), config.gateway.as_deref())?;
    tracing::info!(
        endpoint = %anthropic.endpoint(),
        model = %config.model,
        judge_model = %config.judge_model,
        "LLM client initialized"
    );
    let llm = Arc::new(LoggingService::new(anthropic));

    let console = Arc::new(ConsoleSink::new(tokio::io::stdout(), config.typewriter_delay));
    let runtime = ConversationRuntime::new(
        persona,
        config.runtime_settings(),
        llm,
        Arc::clone(&console),
    );

    tracing::debug!(
        session_id = %runtime.session_id(),
        context_chars = runtime.context().len(),
        "Persona context rendered"
    );

    console
        .print_line(&format!(
            "You are speaking with {} ({}). Commands: /history, /continue, /quit",
            runtime.persona().name,
            runtime.persona().institution
        ))
        .await;

    let exit = run_repl(&runtime, &*console, BufReader::new(tokio::io::stdin())).await?;
    tracing::info!(session_id = %runtime.session_id(), exit = ?exit, "Conversation ended");

    if exit == ReplExit::Continued {
        console.print_line("Moving on.").await;
    }
    runtime.close();
    Ok(())
}
