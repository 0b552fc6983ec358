//! Trait abstractions for runtime output
//!
//! The presentation layer is an external collaborator; tests swap in a
//! recording implementation.

use async_trait::async_trait;
use std::sync::Arc;

/// Consumer of conversation output
#[async_trait]
pub trait PresentationSink: Send + Sync {
    /// Finalized professor text, or a visible error message after a failed
    /// completion
    async fn on_assistant_text(&self, text: &str);

    /// The conversation was judged resolved. Called at most once per session.
    async fn on_resolved(&self);
}

#[async_trait]
impl<T: PresentationSink + ?Sized> PresentationSink for Arc<T> {
    async fn on_assistant_text(&self, text: &str) {
        (**self).on_assistant_text(text).await;
    }

    async fn on_resolved(&self) {
        (**self).on_resolved().await;
    }
}
