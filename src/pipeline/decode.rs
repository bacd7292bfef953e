//! Incremental event-stream decoder (bytes -> text increments).
//!
//! The decoder knows nothing about HTTP. It splits its input on newlines, keeps at most one
//! incomplete line between calls, and turns every complete `data:` line into a
//! [`DecodedEvent`]. Lines are split on raw bytes before UTF-8 decoding, so a multi-byte
//! character cut in half by a chunk boundary is reassembled.

use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::trace;

/// Marker in front of each event payload.
pub const DATA_PREFIX: &str = "data:";
/// Payload that terminates the stream.
pub const DONE_SIGNAL: &str = "[DONE]";

/// Primary and fallback names of the text field.
const TEXT_FIELDS: [&str; 2] = ["content", "text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// A piece of generated text.
    Delta(String),
    /// The server reported an error in-band.
    Error(String),
    /// The terminal sentinel was seen.
    Done,
}

/// Push-style decoder state for one response body.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    carry: Vec<u8>,
    done: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen. Further input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes of the incomplete line currently carried over.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Consume one chunk and return the events of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.carry.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(pos) = self.carry[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let event = decode_line(&String::from_utf8_lossy(&self.carry[start..end]));
            start = end + 1;
            if let Some(event) = event {
                let terminal = event == DecodedEvent::Done;
                out.push(event);
                if terminal {
                    self.done = true;
                    break;
                }
            }
        }

        if self.done {
            self.carry.clear();
        } else {
            self.carry.drain(..start);
        }
        out
    }

    /// Flush the carried-over line at end of input (a final line without a newline).
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        if self.done || self.carry.is_empty() {
            self.carry.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.carry);
        match decode_line(&String::from_utf8_lossy(&line)) {
            Some(event) => {
                self.done = event == DecodedEvent::Done;
                vec![event]
            }
            None => Vec::new(),
        }
    }
}

/// Decode one complete line. Blank, comment and unparsable lines yield nothing.
pub fn decode_line(line: &str) -> Option<DecodedEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let payload = match trimmed.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.trim(),
        None => trimmed,
    };
    if payload == DONE_SIGNAL {
        return Some(DecodedEvent::Done);
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => decode_payload(&value),
        Err(_) => {
            trace!(line = trimmed, "ignoring non-JSON stream line");
            None
        }
    }
}

fn decode_payload(value: &Value) -> Option<DecodedEvent> {
    let text = TEXT_FIELDS
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str));
    if let Some(text) = text.filter(|t| !t.is_empty()) {
        return Some(DecodedEvent::Delta(text.to_string()));
    }
    value
        .get("error")
        .filter(|e| !e.is_null())
        .map(|e| DecodedEvent::Error(error_message(e)))
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

struct DecodeState {
    input: BoxStream<'static, Bytes>,
    decoder: StreamDecoder,
    queue: VecDeque<DecodedEvent>,
    ended: bool,
}

/// Adapt a byte stream into a stream of decoded events.
///
/// The output ends after [`DecodedEvent::Done`] or when the input is exhausted. Input
/// errors are forwarded once and end the stream.
pub fn decode_stream(input: BoxStream<'static, Bytes>) -> BoxStream<'static, DecodedEvent> {
    let state = DecodeState {
        input,
        decoder: StreamDecoder::new(),
        queue: VecDeque::new(),
        ended: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.queue.pop_front() {
                if event == DecodedEvent::Done {
                    st.ended = true;
                    st.queue.clear();
                }
                return Some((Ok(event), st));
            }
            if st.ended {
                return None;
            }
            match st.input.next().await {
                Some(Ok(bytes)) => {
                    let events = st.decoder.feed(&bytes);
                    st.queue.extend(events);
                }
                Some(Err(e)) => {
                    st.ended = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.ended = true;
                    let events = st.decoder.finish();
                    st.queue.extend(events);
                }
            }
        }
    });

    Box::pin(stream)
}
