//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::PresentationSink;
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a text reply
    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::text_only(text));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.next(request)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Delayed Mock LLM Client (for concurrency and teardown testing)
// ============================================================================

/// Mock LLM client that sleeps before answering
pub struct DelayedMockLlmClient {
    inner: MockLlmClient,
    delay: Duration,
    /// Notified when a request starts (for test synchronization)
    pub request_started: Arc<Notify>,
}

impl DelayedMockLlmClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockLlmClient::new(),
            delay,
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.inner.queue_response(response);
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.inner.recorded_requests()
    }
}

#[async_trait]
impl LlmService for DelayedMockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.next(request)
    }

    fn name(&self) -> &str {
        "delayed-mock"
    }
}

// ============================================================================
// Recording Sink
// ============================================================================

/// What a sink was shown, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Text(String),
    Resolved,
}

/// Presentation sink that records everything it is shown
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    /// Time spent "showing" each text before it is recorded
    text_delay: Duration,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that takes `delay` to show each text, like a typewriter
    pub fn with_text_delay(delay: Duration) -> Self {
        Self {
            events: Mutex::default(),
            text_delay: delay,
        }
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Text(text) => Some(text),
                SinkEvent::Resolved => None,
            })
            .collect()
    }

    pub fn resolved_calls(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == SinkEvent::Resolved)
            .count()
    }
}

#[async_trait]
impl PresentationSink for RecordingSink {
    async fn on_assistant_text(&self, text: &str) {
        if !self.text_delay.is_zero() {
            tokio::time::sleep(self.text_delay).await;
        }
        self.events.lock().unwrap().push(SinkEvent::Text(text.to_string()));
    }

    async fn on_resolved(&self) {
        self.events.lock().unwrap().push(SinkEvent::Resolved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_llm_client() {
        let mock = MockLlmClient::new();
        mock.queue_text("Hello");

        let request = LlmRequest::new("test-model", 100);

        let response = mock.complete(&request).await.unwrap();
        assert_eq!(response.first_text(), Some("Hello"));

        // Second call should fail (no more responses)
        let result = mock.complete(&request).await;
        assert!(result.is_err());
        assert_eq!(mock.recorded_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.on_assistant_text("one").await;
        sink.on_resolved().await;

        assert_eq!(sink.texts(), vec!["one".to_string()]);
        assert_eq!(sink.resolved_calls(), 1);
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Text("one".to_string()), SinkEvent::Resolved]
        );
    }
}
