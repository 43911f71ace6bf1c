//! Deterministic scripted provider for relay and client tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_stream::stream;
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Duration, sleep};

use crate::client::{ChatProvider, ChatRequest, DeltaStream, FinishReason, StreamChunk};
use crate::error::{ProviderError, Result};

/// One scripted streaming step.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Emit a text delta.
    Delta(String),
    /// Pause before the next step.
    Delay(u64),
    /// Break the stream with an error.
    Fail(String),
}

impl MockStep {
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta(text.into())
    }

    pub fn delay_ms(millis: u64) -> Self {
        Self::Delay(millis)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    completed: AtomicUsize,
    abandoned: AtomicUsize,
}

/// Scripted provider double.
///
/// Every opened stream replays the same script. The mock counts how
/// often it was called, and it observes abandonment: a stream dropped
/// before reaching its end (the relay's cancellation path) bumps the
/// abandon counter and wakes [`MockProvider::wait_abandoned`].
#[derive(Clone)]
pub struct MockProvider {
    model: String,
    script: Arc<Vec<MockStep>>,
    open_error: Option<Arc<ProviderError>>,
    counters: Arc<Counters>,
    abandoned_notify: Arc<Notify>,
}

impl MockProvider {
    pub fn from_steps(steps: Vec<MockStep>) -> Self {
        Self {
            model: "mock-model".to_string(),
            script: Arc::new(steps),
            open_error: None,
            counters: Arc::new(Counters::default()),
            abandoned_notify: Arc::new(Notify::new()),
        }
    }

    /// A mock whose every request fails to open.
    pub fn failing_open(message: impl Into<String>) -> Self {
        let mut mock = Self::from_steps(Vec::new());
        mock.open_error = Some(Arc::new(ProviderError::Api {
            provider: "mock".to_string(),
            status: 503,
            message: message.into(),
            retry_after_secs: None,
        }));
        mock
    }

    pub fn open_count(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn complete_count(&self) -> usize {
        self.counters.completed.load(Ordering::SeqCst)
    }

    pub fn abandon_count(&self) -> usize {
        self.counters.abandoned.load(Ordering::SeqCst)
    }

    /// Resolves once a stream has been dropped before its end.
    pub async fn wait_abandoned(&self) {
        while self.abandon_count() == 0 {
            self.abandoned_notify.notified().await;
        }
    }

    fn open_failure(&self) -> Option<ProviderError> {
        self.open_error.as_ref().map(|err| match err.as_ref() {
            ProviderError::Api {
                provider,
                status,
                message,
                retry_after_secs,
            } => ProviderError::Api {
                provider: provider.clone(),
                status: *status,
                message: message.clone(),
                retry_after_secs: *retry_after_secs,
            },
            other => ProviderError::Stream(other.to_string()),
        })
    }
}

/// Flags the stream as abandoned unless it ran to its scripted end.
struct StreamGuard {
    finished: bool,
    counters: Arc<Counters>,
    notify: Arc<Notify>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.counters.abandoned.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_waiters();
        }
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _request: ChatRequest) -> Result<String> {
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_failure() {
            return Err(err);
        }

        let mut text = String::new();
        for step in self.script.iter() {
            match step {
                MockStep::Delta(delta) => text.push_str(delta),
                MockStep::Delay(millis) => sleep(Duration::from_millis(*millis)).await,
                MockStep::Fail(message) => {
                    return Err(ProviderError::Stream(message.clone()));
                }
            }
        }
        Ok(text)
    }

    async fn open_stream(&self, _request: ChatRequest) -> Result<DeltaStream> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.open_failure() {
            return Err(err);
        }

        let script = Arc::clone(&self.script);
        let mut guard = StreamGuard {
            finished: false,
            counters: Arc::clone(&self.counters),
            notify: Arc::clone(&self.abandoned_notify),
        };

        Ok(Box::pin(stream! {
            // Move the whole guard into the stream; edition-2024 disjoint
            // captures would otherwise capture only the Copy `finished`
            // field and drop the guard before the stream is consumed.
            let mut guard = guard;
            for step in script.iter() {
                match step {
                    MockStep::Delta(delta) => yield Ok(StreamChunk::text(delta.clone())),
                    MockStep::Delay(millis) => sleep(Duration::from_millis(*millis)).await,
                    MockStep::Fail(message) => {
                        guard.finished = true;
                        yield Err(ProviderError::Stream(message.clone()));
                        return;
                    }
                }
            }
            guard.finished = true;
            yield Ok(StreamChunk::finished(FinishReason::Stop));
        }))
    }
}
