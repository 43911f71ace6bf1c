//! OpenAI-compatible chat-completions provider.
//!
//! Works against any endpoint speaking the chat-completions wire format;
//! the default base URL points at OpenRouter.

use std::time::Duration;

use async_stream::try_stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::client::{ChatProvider, ChatRequest, DeltaStream, FinishReason, StreamChunk};
use crate::error::{ProviderError, Result};
use crate::retry::{RetryConfig, response_to_error};
use crate::sse::{SseBuffer, data_lines};

use async_trait::async_trait;
use chatrelay_models::{Role, Turn};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

const DISABLE_SYSTEM_PROXY_ENV: &str = "CHATRELAY_DISABLE_SYSTEM_PROXY";

/// Connections honor the system proxy unless opted out through the
/// environment. Streaming reads carry no overall timeout; only the
/// connect phase is bounded.
fn default_client() -> Client {
    let mut builder = Client::builder().connect_timeout(Duration::from_secs(10));
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        builder = builder.no_proxy();
    }
    builder.build().unwrap_or_default()
}

/// OpenAI-compatible client.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
    retry_config: RetryConfig,
}

impl OpenAiProvider {
    /// Create a new provider client against the default base URL.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: None,
            title: None,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set the model to use
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set custom base URL (for API-compatible services)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Attribution headers some gateways (OpenRouter) expect.
    pub fn with_attribution(
        mut self,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        self.referer = Some(referer.into());
        self.title = Some(title.into());
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Use a caller-built reqwest client (custom proxy, timeouts, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> ApiRequest {
        let messages = request
            .history
            .turns()
            .iter()
            .map(ApiMessage::from)
            .collect();

        ApiRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
        }
    }

    async fn send(&self, body: &ApiRequest) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");

        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer.clone());
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title.clone());
        }

        builder.json(body).send().await
    }

    /// Send with bounded retries. Only connection failures and retryable
    /// statuses are retried; a success response is returned as-is.
    async fn send_with_retry(&self, body: &ApiRequest) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=self.retry_config.max_retries {
            let response = match self.send(body).await {
                Ok(response) => response,
                Err(err) => {
                    let error = ProviderError::Http(err);
                    if !error.is_retryable() || attempt == self.retry_config.max_retries {
                        return Err(error);
                    }
                    let delay = self.retry_config.delay_for(attempt + 1, None);
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "retrying upstream request after connection error"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(error);
                    continue;
                }
            };

            if response.status().is_success() {
                return Ok(response);
            }

            let error = response_to_error(response, self.name()).await;
            if !error.is_retryable() || attempt == self.retry_config.max_retries {
                return Err(error);
            }

            let delay = self
                .retry_config
                .delay_for(attempt + 1, error.retry_after());
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis(),
                "retrying upstream request"
            );
            tokio::time::sleep(delay).await;
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::Exhausted("upstream request failed".to_string())))
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let body = self.build_body(&request, false);
        let response = self.send_with_retry(&body).await?;

        let data: ApiResponse = response.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse(self.name().to_string()))?;

        choice
            .message
            .and_then(|message| message.content)
            .ok_or_else(|| ProviderError::EmptyResponse(self.name().to_string()))
    }

    async fn open_stream(&self, request: ChatRequest) -> Result<DeltaStream> {
        let body = self.build_body(&request, true);
        let response = self.send_with_retry(&body).await?;

        let mut byte_stream = response.bytes_stream();

        Ok(Box::pin(try_stream! {
            let mut buffer = SseBuffer::new();

            'outer: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk
                    .map_err(|err| ProviderError::Stream(format!("upstream read failed: {err}")))?;
                buffer.push(&chunk);

                while let Some(event) = buffer.next_event() {
                    for chunk in parse_event(&event) {
                        let Some(chunk) = chunk else { break 'outer };
                        yield chunk;
                    }
                }
            }

            // The last event may lack its trailing blank line when the
            // upstream closes the connection right after it.
            if let Some(event) = buffer.take_remainder() {
                for chunk in parse_event(&event).flatten() {
                    yield chunk;
                }
            }
        }))
    }
}

/// Parse one SSE event into deltas. `None` items mark the `[DONE]`
/// sentinel; unparseable payloads are skipped.
fn parse_event(event: &str) -> impl Iterator<Item = Option<StreamChunk>> + '_ {
    data_lines(event).filter_map(|data| {
        if data.trim() == "[DONE]" {
            return Some(None);
        }

        let parsed: StreamResponse = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(_) => return None,
        };

        let choice = parsed.choices.into_iter().next()?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            let reason = match reason {
                "length" => FinishReason::Length,
                _ => FinishReason::Stop,
            };
            return Some(Some(StreamChunk::finished(reason)));
        }

        // Role-only and metadata-only deltas carry no text; skip them.
        match choice.delta.and_then(|delta| delta.content) {
            Some(text) if !text.is_empty() => Some(Some(StreamChunk::text(text))),
            _ => None,
        }
    })
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&Turn> for ApiMessage {
    fn from(turn: &Turn) -> Self {
        let role = match turn.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: turn.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: Option<ApiResponseMessage>,
}

#[derive(Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

// Streaming types

#[derive(Deserialize, Debug)]
struct StreamResponse {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDelta {
    content: Option<String>,
}
