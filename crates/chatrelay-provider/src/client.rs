//! Provider trait and request/delta types

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use chatrelay_models::ConversationHistory;

use crate::error::Result;

/// A completion request sent upstream.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub history: ConversationHistory,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            history,
            model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Why the upstream stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
}

/// One incremental fragment of generated text.
///
/// Deltas carry no identity of their own; order of arrival is the only
/// structure. A chunk with an empty `text` and a `finish_reason` is the
/// upstream's completion signal.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub text: String,
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
        }
    }

    pub fn finished(reason: FinishReason) -> Self {
        Self {
            text: String::new(),
            finish_reason: Some(reason),
        }
    }
}

/// Ordered, lazily produced sequence of deltas from one upstream request.
///
/// Dropping the stream before it ends abandons the upstream request and
/// closes its connection; that is how caller cancellation reaches the
/// provider.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// Upstream provider client.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name, for logging and error messages.
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    /// Single-shot completion.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Open an incremental-generation request.
    ///
    /// The upstream call is issued and its response status checked before
    /// this returns, so an open failure surfaces here as an error and
    /// never as a broken stream. One call maps to exactly one upstream
    /// request.
    async fn open_stream(&self, request: ChatRequest) -> Result<DeltaStream>;
}
