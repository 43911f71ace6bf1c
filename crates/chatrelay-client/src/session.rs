//! Chat session: owns the transcript and folds a relay stream back into
//! it, one observable update per chunk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use chatrelay_models::{ConversationHistory, EntryId, EntryState, Transcript, Turn};

use crate::cancel::CancelToken;
use crate::decode::Utf8Decoder;
use crate::error::ClientError;
use crate::events::UpdateEvent;
use crate::transport::{ByteStream, RelayClient};

const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);

/// One user-visible conversation.
///
/// At most one streaming request is in flight per session. While a stream
/// runs, the assistant entry being filled is the transcript's single open
/// entry; every other entry is frozen.
pub struct ChatSession {
    relay: RelayClient,
    transcript: Transcript,
    in_flight: Arc<AtomicBool>,
    inactivity_timeout: Duration,
}

/// Marks the session as streaming for as long as it is alive. Released
/// on drop, so a send future abandoned mid-await (a lost `select!` race,
/// an expired outer timeout) does not wedge the session.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, ClientError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(ClientError::RequestInFlight);
        }
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl ChatSession {
    pub fn new(relay: RelayClient) -> Self {
        Self {
            relay,
            transcript: Transcript::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
        }
    }

    /// How long a single read may stall before the stream is abandoned.
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The frozen turns plus the message about to be sent. Built without
    /// touching the transcript so a refused request leaves no trace.
    fn history_with(&self, message: &str) -> Result<ConversationHistory, ClientError> {
        let mut turns: Vec<Turn> = self
            .transcript
            .entries()
            .iter()
            .filter(|entry| entry.state == EntryState::Frozen)
            .map(|entry| Turn {
                role: entry.role,
                content: entry.content.clone(),
            })
            .collect();
        turns.push(Turn::user(message));
        Ok(ConversationHistory::new(turns)?)
    }

    /// Send a user message and stream the reply into the transcript.
    ///
    /// The transcript is only mutated once the relay has accepted the
    /// request: a validation failure or a refused open leaves it exactly
    /// as it was. On success both the user turn and the frozen assistant
    /// entry are present; on mid-stream failure the placeholder is rolled
    /// back and only the user turn remains.
    pub async fn send_streaming(
        &mut self,
        message: impl Into<String>,
        cancel: CancelToken,
        on_event: impl FnMut(UpdateEvent),
    ) -> Result<EntryId, ClientError> {
        if self.in_flight.load(Ordering::Acquire) {
            return Err(ClientError::RequestInFlight);
        }
        let message = message.into();
        let history = self.history_with(&message)?;

        let stream = self.relay.open_stream(&history).await?;
        self.transcript.push_user(message);
        self.consume_stream(stream, cancel, on_event).await
    }

    /// Reconstruct one reply from an already-open byte stream.
    ///
    /// Public so the read loop can be driven from any byte source, not
    /// just a live relay connection.
    pub async fn consume_stream(
        &mut self,
        mut stream: ByteStream,
        mut cancel: CancelToken,
        mut on_event: impl FnMut(UpdateEvent),
    ) -> Result<EntryId, ClientError> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;

        // An abandoned read loop leaves its placeholder behind; the
        // stream that fed it is gone, so roll it back like any other
        // failed stream before starting the new one.
        if let Some(stale) = self.transcript.open_entry().map(|entry| entry.id) {
            self.transcript.remove(stale)?;
        }

        self.read_loop(&mut stream, &mut cancel, &mut on_event)
            .await
    }

    async fn read_loop(
        &mut self,
        stream: &mut ByteStream,
        cancel: &mut CancelToken,
        on_event: &mut impl FnMut(UpdateEvent),
    ) -> Result<EntryId, ClientError> {
        let entry = self.transcript.push_placeholder()?;
        let mut decoder = Utf8Decoder::new();
        let mut content = String::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    // Abandoned means immutable: whatever arrived stays.
                    self.transcript.freeze(entry)?;
                    debug!(bytes = content.len(), "stream cancelled");
                    on_event(UpdateEvent::Cancelled { entry });
                    return Ok(entry);
                }

                next = tokio::time::timeout(self.inactivity_timeout, stream.next()) => {
                    let chunk = match next {
                        Err(_) => {
                            let err = ClientError::Timeout(self.inactivity_timeout.as_secs());
                            return self.fail(entry, err, on_event);
                        }
                        Ok(Some(Err(err))) => return self.fail(entry, err, on_event),
                        Ok(Some(Ok(bytes))) => bytes,
                        Ok(None) => {
                            if let Err(err) = decoder.finish() {
                                return self.fail(entry, err, on_event);
                            }
                            self.transcript.freeze(entry)?;
                            on_event(UpdateEvent::Completed {
                                entry,
                                content: content.clone(),
                            });
                            return Ok(entry);
                        }
                    };

                    let text = match decoder.feed(&chunk) {
                        Ok(text) => text,
                        Err(err) => return self.fail(entry, err, on_event),
                    };
                    // Empty when the chunk ended mid-character.
                    if text.is_empty() {
                        continue;
                    }
                    content.push_str(&text);
                    self.transcript.set_content(entry, content.clone())?;
                    on_event(UpdateEvent::Update {
                        entry,
                        content: content.clone(),
                    });
                }
            }
        }
    }

    /// Roll back the placeholder and surface the failure.
    fn fail(
        &mut self,
        entry: EntryId,
        err: ClientError,
        on_event: &mut impl FnMut(UpdateEvent),
    ) -> Result<EntryId, ClientError> {
        self.transcript.remove(entry)?;
        on_event(UpdateEvent::Failed {
            message: err.to_string(),
        });
        Err(err)
    }

    /// Non-streaming send: one round trip, two frozen entries on success.
    pub async fn send(&mut self, message: impl Into<String>) -> Result<EntryId, ClientError> {
        if self.in_flight.load(Ordering::Acquire) {
            return Err(ClientError::RequestInFlight);
        }
        let message = message.into();
        let history = self.history_with(&message)?;

        let content = self.relay.complete(&history).await?;
        self.transcript.push_user(message);
        Ok(self.transcript.push_assistant(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;
    use futures::stream;

    use crate::cancel::CancelHandle;

    fn session() -> ChatSession {
        ChatSession::new(RelayClient::new("http://localhost:0"))
            .with_inactivity_timeout(Duration::from_millis(200))
    }

    fn chunks(parts: Vec<Result<&'static [u8], ClientError>>) -> ByteStream {
        Box::pin(stream::iter(
            parts
                .into_iter()
                .map(|part| part.map(Bytes::from_static))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn updates_grow_by_prefix_extension() {
        let mut session = session();
        session.transcript.push_user("hi");
        let (_handle, token) = CancelHandle::new();

        let mut seen: Vec<UpdateEvent> = Vec::new();
        let entry = session
            .consume_stream(
                chunks(vec![Ok(b"Hel"), Ok(b"lo "), Ok(b"there")]),
                token,
                |event| seen.push(event),
            )
            .await
            .expect("clean stream completes");

        let contents: Vec<&str> = seen
            .iter()
            .filter_map(|event| match event {
                UpdateEvent::Update { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["Hel", "Hello ", "Hello there"]);
        for pair in contents.windows(2) {
            assert!(pair[1].starts_with(pair[0]));
        }
        assert_eq!(
            seen.last(),
            Some(&UpdateEvent::Completed {
                entry,
                content: "Hello there".to_string()
            })
        );
        let stored = session.transcript.get(entry).expect("entry kept");
        assert_eq!(stored.state, EntryState::Frozen);
        assert_eq!(stored.content, "Hello there");
    }

    #[tokio::test]
    async fn split_multibyte_character_never_surfaces_partially() {
        let mut session = session();
        session.transcript.push_user("hi");
        let (_handle, token) = CancelHandle::new();

        // "café" with the 'é' split across two chunks.
        let bytes = "café".as_bytes();
        let parts: Vec<Result<&'static [u8], ClientError>> =
            vec![Ok(&bytes[..4]), Ok(&bytes[4..])];

        let mut seen = Vec::new();
        let entry = session
            .consume_stream(chunks(parts), token, |event| seen.push(event))
            .await
            .expect("valid stream");

        assert_eq!(
            session.transcript.get(entry).map(|e| e.content.as_str()),
            Some("café")
        );
        // No update ever carried a mangled character.
        for event in &seen {
            if let UpdateEvent::Update { content, .. } = event {
                assert!(!content.contains('\u{FFFD}'));
            }
        }
    }

    #[tokio::test]
    async fn mid_stream_error_rolls_back_placeholder() {
        let mut session = session();
        session.transcript.push_user("question");
        let (_handle, token) = CancelHandle::new();

        let parts: Vec<Result<&'static [u8], ClientError>> = vec![
            Ok(b"partial ans"),
            Err(ClientError::Stream("connection reset".to_string())),
        ];

        let mut seen = Vec::new();
        let err = session
            .consume_stream(chunks(parts), token, |event| seen.push(event))
            .await
            .err()
            .expect("broken stream fails");

        assert!(matches!(err, ClientError::Stream(_)));
        assert!(matches!(seen.last(), Some(UpdateEvent::Failed { .. })));
        // Only the user turn survives.
        assert_eq!(session.transcript.len(), 1);
        assert!(session.transcript.open_entry().is_none());
    }

    #[tokio::test]
    async fn cancellation_freezes_partial_content() {
        let mut session = session();
        session.transcript.push_user("question");
        let (handle, token) = CancelHandle::new();

        // One chunk, then silence until cancellation fires.
        let stream: ByteStream = Box::pin(
            stream::iter(vec![Ok(Bytes::from_static(b"partial"))]).chain(stream::pending()),
        );

        let mut seen = Vec::new();
        let entry = session
            .consume_stream(stream, token, |event| {
                if matches!(event, UpdateEvent::Update { .. }) {
                    handle.cancel();
                }
                seen.push(event);
            })
            .await
            .expect("cancellation is not an error");

        assert_eq!(seen.last(), Some(&UpdateEvent::Cancelled { entry }));
        let stored = session.transcript.get(entry).expect("entry kept");
        assert_eq!(stored.state, EntryState::Frozen);
        assert_eq!(stored.content, "partial");
        // A frozen partial entry means the next request can proceed.
        assert!(session.transcript.open_entry().is_none());
    }

    #[tokio::test]
    async fn stalled_stream_times_out_and_rolls_back() {
        let mut session = session().with_inactivity_timeout(Duration::from_millis(50));
        session.transcript.push_user("question");
        let (_handle, token) = CancelHandle::new();

        let stream: ByteStream = Box::pin(stream::pending());

        let err = session
            .consume_stream(stream, token, |_| {})
            .await
            .err()
            .expect("stalled stream fails");
        assert!(matches!(err, ClientError::Timeout(_)));
        assert_eq!(session.transcript.len(), 1);
    }

    #[tokio::test]
    async fn dropped_mid_stream_future_releases_the_session() {
        let mut session = session();
        session.transcript.push_user("question");
        let (_handle, token) = CancelHandle::new();

        // Abandon a hung stream mid-await, as a lost select race or an
        // outer timeout would.
        let hung: ByteStream = Box::pin(stream::pending());
        let first = session.consume_stream(hung, token, |_| {});
        let raced = tokio::time::timeout(Duration::from_millis(20), first).await;
        assert!(raced.is_err(), "hung stream must not complete");

        // The abandoned run's placeholder is rolled back and the next
        // request proceeds; the session is not wedged behind the guard.
        let (_handle, token) = CancelHandle::new();
        let entry = session
            .consume_stream(chunks(vec![Ok(b"recovered")]), token, |_| {})
            .await
            .expect("session is usable after an abandoned future");

        assert_eq!(
            session.transcript.get(entry).map(|e| e.content.as_str()),
            Some("recovered")
        );
        assert_eq!(session.transcript.len(), 2);
        assert!(session.transcript.open_entry().is_none());
    }
}
