//! Chat endpoints: the streaming relay and its non-streaming sibling.

use axum::{
    Json, Router,
    body::Body,
    extract::Extension,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use chatrelay_models::{ConversationHistory, Turn};
use chatrelay_provider::ChatRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router {
    Router::new()
        .route("/", post(complete_chat))
        .route("/stream", post(stream_chat))
}

#[derive(Debug, Deserialize)]
struct ChatPayload {
    messages: Vec<Turn>,
}

impl ChatPayload {
    /// Validate into a well-formed history. Fails before anything is
    /// allocated upstream.
    fn into_history(self) -> Result<ConversationHistory, ApiError> {
        Ok(ConversationHistory::new(self.messages)?)
    }
}

/// Relay endpoint: one upstream request, one open-ended byte stream.
///
/// Each upstream delta is forwarded in arrival order with no coalescing.
/// Upstream completion ends the body cleanly; a mid-stream upstream
/// failure turns into an `Err` item in the body stream, which aborts the
/// response so the client sees a read error rather than a clean EOF.
/// If the client disconnects, hyper drops the body stream and with it
/// the upstream connection, cancelling the provider request.
async fn stream_chat(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Response, ApiError> {
    let history = payload.into_history()?;
    let request =
        ChatRequest::new(history).with_max_tokens(state.defaults.stream_max_tokens);

    let deltas = state.provider.open_stream(request).await?;

    let bytes = deltas.filter_map(|result| async move {
        match result {
            Ok(chunk) if chunk.text.is_empty() => None,
            Ok(chunk) => Some(Ok(Bytes::from(chunk.text))),
            Err(err) => {
                tracing::warn!(error = %err, "upstream stream broke mid-flight");
                Some(Err(std::io::Error::other(err.to_string())))
            }
        }
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(bytes))
        .map_err(|err| ApiError::internal(err.to_string()))?;

    Ok(response)
}

/// Non-streaming sibling: single request, single JSON response.
async fn complete_chat(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Response, ApiError> {
    let history = payload
        .into_history()?
        .with_system_prefix(&state.defaults.system_prompt);
    let request =
        ChatRequest::new(history).with_max_tokens(state.defaults.completion_max_tokens);

    match state.provider.complete(request).await {
        Ok(content) => Ok(Json(json!({ "content": content })).into_response()),
        Err(err) => {
            tracing::error!(error = %err, "completion request failed");
            Ok((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response())
        }
    }
}
