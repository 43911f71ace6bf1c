//! HTTP transport to a relay server.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use chatrelay_models::ConversationHistory;

use crate::error::ClientError;

/// Raw byte stream from a relay response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[derive(Deserialize)]
struct CompletionBody {
    content: Option<String>,
    error: Option<serde_json::Value>,
}

/// Thin client for the relay's HTTP surface.
///
/// Knows URLs and status codes; transcript bookkeeping lives in
/// [`crate::ChatSession`].
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Opens a streaming chat and returns the response body as raw bytes.
    ///
    /// A non-2xx status is surfaced as [`ClientError::Relay`] before any
    /// bytes are yielded, so callers can fail without touching state.
    pub async fn open_stream(&self, history: &ConversationHistory) -> Result<ByteStream, ClientError> {
        let url = format!("{}/api/chat/stream", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "messages": history.turns() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = relay_error_message(response).await;
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string())));
        Ok(Box::pin(stream))
    }

    /// Requests a whole completion in one round trip.
    pub async fn complete(&self, history: &ConversationHistory) -> Result<String, ClientError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "messages": history.turns() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = relay_error_message(response).await;
            return Err(ClientError::Relay {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionBody = response.json().await?;
        if let Some(content) = body.content {
            return Ok(content);
        }
        let message = body
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "missing content in completion response".to_string());
        Err(ClientError::Relay {
            status: status.as_u16(),
            message,
        })
    }
}

async fn relay_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => {
            // The relay wraps errors as {"error":{"code":..,"message":..}};
            // fall back to the raw body for anything else.
            serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(body)
        }
        _ => format!("relay returned status {status}"),
    }
}
