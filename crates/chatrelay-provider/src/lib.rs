//! Upstream language-model provider clients.
//!
//! The relay talks to an OpenAI-compatible chat-completions API through
//! the [`ChatProvider`] trait. [`OpenAiProvider`] is the real HTTP
//! implementation; [`MockProvider`] is a deterministic scripted double
//! for tests.

mod client;
mod error;
mod mock;
mod openai;
mod retry;
mod sse;

pub use client::{ChatProvider, ChatRequest, DeltaStream, FinishReason, StreamChunk};
pub use error::{ProviderError, Result};
pub use mock::{MockProvider, MockStep};
pub use openai::OpenAiProvider;
pub use retry::RetryConfig;
