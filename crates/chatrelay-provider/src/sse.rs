//! Buffered splitter for server-sent-event payloads.
//!
//! Network chunks do not align with SSE event boundaries, so raw bytes
//! accumulate here until a blank line completes an event. Buffering at
//! the byte level keeps multi-byte characters intact when the split
//! point lands inside one.

#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Pop the next complete event, if the buffer holds one. Events end
    /// at a blank line; both bare-LF and CRLF line endings count.
    pub(crate) fn next_event(&mut self) -> Option<String> {
        let (pos, separator_len) = find_separator(&self.buffer)?;
        let event: Vec<u8> = self.buffer.drain(..pos + separator_len).take(pos).collect();
        Some(String::from_utf8_lossy(&event).into_owned())
    }

    /// Drain whatever is left once the stream ends. Handles the final
    /// event lacking its trailing blank line.
    pub(crate) fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.iter().all(|byte| byte.is_ascii_whitespace()) {
            self.buffer.clear();
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Earliest event separator in the buffer, with its byte length.
fn find_separator(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer
        .windows(2)
        .position(|window| window == b"\n\n")
        .map(|pos| (pos, 2));
    let crlf = buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| (pos, 4));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (found, other) => found.or(other),
    }
}

/// Extract the payload of every `data:` line in an event.
pub(crate) fn data_lines(event: &str) -> impl Iterator<Item = &str> {
    event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
}
