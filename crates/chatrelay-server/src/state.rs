//! Shared request state: the injected provider and request defaults.

use std::sync::Arc;

use chatrelay_provider::ChatProvider;

/// Per-request limits applied when the caller does not set its own.
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub stream_max_tokens: u32,
    pub completion_max_tokens: u32,
    pub system_prompt: String,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            stream_max_tokens: 500,
            completion_max_tokens: 1000,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

/// Application state handed to every handler.
///
/// The provider is an explicitly constructed, injectable value; the
/// server holds no other state, so concurrent relay operations share
/// nothing mutable.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ChatProvider>,
    pub defaults: RequestDefaults,
}

impl AppState {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            defaults: RequestDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: RequestDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}
