//! End-to-end tests for the relay over a real TCP listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use chatrelay_provider::{MockProvider, MockStep};
use chatrelay_server::{AppState, HttpConfig, build_router};

async fn spawn_relay(provider: MockProvider) -> SocketAddr {
    let state = AppState::new(Arc::new(provider));
    let app = build_router(state, &HttpConfig::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port available");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });
    addr
}

fn chat_body(content: &str) -> serde_json::Value {
    serde_json::json!({ "messages": [{ "role": "user", "content": content }] })
}

#[tokio::test]
async fn relays_deltas_in_arrival_order() {
    let provider = MockProvider::from_steps(vec![
        MockStep::delta("Hel"),
        MockStep::delta("lo caf"),
        MockStep::delta("é!"),
    ]);
    let addr = spawn_relay(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat/stream"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/plain; charset=utf-8")
    );

    let body = response.bytes().await.expect("stream ends cleanly");
    assert_eq!(std::str::from_utf8(&body).expect("valid UTF-8"), "Hello café!");
    assert_eq!(provider.open_count(), 1);
}

#[tokio::test]
async fn invalid_request_is_rejected_without_upstream_call() {
    let provider = MockProvider::from_steps(vec![MockStep::delta("never")]);
    let addr = spawn_relay(provider.clone()).await;
    let client = reqwest::Client::new();

    for body in [
        serde_json::json!({ "messages": [] }),
        serde_json::json!({ "messages": [{ "role": "user", "content": "" }] }),
        serde_json::json!({}),
    ] {
        let response = client
            .post(format!("http://{addr}/api/chat/stream"))
            .json(&body)
            .send()
            .await
            .expect("request completes");
        assert!(
            response.status().is_client_error(),
            "{body} should be rejected, got {}",
            response.status()
        );
    }

    assert_eq!(provider.open_count(), 0);
}

#[tokio::test]
async fn upstream_open_failure_is_a_failed_open_not_a_stream() {
    let provider = MockProvider::failing_open("no capacity");
    let addr = spawn_relay(provider).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat/stream"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("request completes");

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.expect("JSON error body");
    assert!(body["error"]["message"].as_str().is_some());
}

#[tokio::test]
async fn mid_stream_failure_aborts_after_partial_delivery() {
    let provider = MockProvider::from_steps(vec![
        MockStep::delta("partial "),
        MockStep::delta("answer"),
        // Pace the failure so the 200 headers and deltas flush before the
        // body aborts; an immediate failure collapses into a refused open.
        MockStep::delay_ms(50),
        MockStep::fail("connection reset by provider"),
    ]);
    let addr = spawn_relay(provider).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat/stream"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("stream opens with 200");
    assert_eq!(response.status(), 200);

    let mut stream = response.bytes_stream();
    let mut received = Vec::new();
    let mut saw_error = false;
    while let Some(item) = stream.next().await {
        match item {
            Ok(bytes) => received.extend_from_slice(&bytes),
            Err(_) => {
                saw_error = true;
                break;
            }
        }
    }

    assert!(saw_error, "broken upstream must not look like clean EOF");
    let text = String::from_utf8_lossy(&received);
    assert!("partial answer".starts_with(text.as_ref()));
}

#[tokio::test]
async fn client_disconnect_cancels_upstream_request() {
    let provider = MockProvider::from_steps(vec![
        MockStep::delta("first"),
        MockStep::delay_ms(30_000),
        MockStep::delta("never delivered"),
    ]);
    let addr = spawn_relay(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat/stream"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("stream opens");

    let mut stream = response.bytes_stream();
    let first = stream.next().await.expect("first chunk arrives");
    assert_eq!(first.expect("chunk ok"), "first");
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), provider.wait_abandoned())
        .await
        .expect("cancellation reaches the provider within bounded time");
}

#[tokio::test]
async fn sibling_endpoint_returns_full_content() {
    let provider = MockProvider::from_steps(vec![
        MockStep::delta("complete "),
        MockStep::delta("answer"),
    ]);
    let addr = spawn_relay(provider.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("JSON body");
    assert_eq!(body["content"], "complete answer");
    assert_eq!(provider.complete_count(), 1);
}

#[tokio::test]
async fn sibling_endpoint_maps_failure_to_error_body() {
    let provider = MockProvider::failing_open("provider down");
    let addr = spawn_relay(provider).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .json(&chat_body("hi"))
        .send()
        .await
        .expect("request completes");

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.expect("JSON body");
    assert!(body["error"].as_str().expect("error string").contains("provider down"));
}

#[tokio::test]
async fn health_endpoint_responds() {
    let addr = spawn_relay(MockProvider::from_steps(Vec::new())).await;
    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .expect("request succeeds")
        .text()
        .await
        .expect("body reads");
    assert_eq!(body, "OK");
}
