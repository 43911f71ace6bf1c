//! Incremental UTF-8 decoding across chunk boundaries.

use crate::error::ClientError;

/// Stateful UTF-8 decoder.
///
/// Byte chunks from the relay do not align with character boundaries: a
/// multi-byte character can be split across two reads. The decoder keeps
/// the incomplete tail between `feed` calls, so the caller always gets
/// back whole characters and never a mangled replacement.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of the accumulated input as forms complete
    /// characters. Returns an empty string when a chunk ends mid-character
    /// and the continuation has not arrived yet.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<String, ClientError> {
        self.pending.extend_from_slice(bytes);

        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                Ok(text)
            }
            Err(err) => {
                if err.error_len().is_some() {
                    // Genuinely invalid bytes, not an incomplete tail.
                    self.pending.clear();
                    return Err(ClientError::Decode(format!(
                        "invalid byte sequence at offset {}",
                        err.valid_up_to()
                    )));
                }

                let tail = self.pending.split_off(err.valid_up_to());
                let head = std::mem::replace(&mut self.pending, tail);
                // The head is valid by construction of `valid_up_to`.
                String::from_utf8(head)
                    .map_err(|err| ClientError::Decode(err.to_string()))
            }
        }
    }

    /// The stream is over; a leftover partial character is a truncation.
    pub fn finish(&mut self) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            self.pending.clear();
            Err(ClientError::Decode(
                "stream ended inside a multi-byte character".to_string(),
            ))
        }
    }
}
