//! Server-Sent-Events framing and the head-event stream.
//!
//! The beacon node pushes head updates over `GET /eth/v1/events?topics=head`
//! as an SSE stream. [`SseParser`] implements the event-stream framing per
//! the SSE specification:
//!
//! - `data:` lines accumulate and join with `\n` until a blank line
//!   dispatches the frame
//! - lines starting with `:` are comments (keep-alives) and are skipped
//! - `event:` names the frame; `id:` and `retry:` fields are tolerated
//!   and ignored
//! - both `\n` and `\r\n` line endings are accepted
//!
//! [`HeadEventStream`] drives a parser over the HTTP byte stream on a
//! background task and yields decoded [`HeadEvent`]s. Frames that fail to
//! decode are skipped with a warning, not fatal.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::{HeadEvent, HeadFrame};

/// Buffered events between the reader task and the consumer.
const EVENT_CHANNEL_CAPACITY: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// SSE PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Concatenated `data:` payload.
    pub data: String,
}

/// Incremental SSE framing parser.
///
/// Feed it raw bytes as they arrive; it returns every frame completed by
/// the chunk. Partial lines and partial frames are buffered across calls.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Unterminated tail of the byte stream.
    buffer: String,
    /// `data:` lines of the frame being assembled.
    data_lines: Vec<String>,
    /// `event:` field of the frame being assembled.
    event_type: Option<String>,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of bytes and return all frames it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            line.truncate(line.len() - 1);
            if line.ends_with('\r') {
                line.truncate(line.len() - 1);
            }
            self.process_line(&line, &mut frames);
        }

        frames
    }

    /// Handle one complete line of the stream.
    fn process_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        // Blank line dispatches the pending frame.
        if line.is_empty() {
            if !self.data_lines.is_empty() {
                frames.push(SseFrame {
                    event: self.event_type.take(),
                    data: self.data_lines.join("\n"),
                });
                self.data_lines.clear();
            } else {
                self.event_type = None;
            }
            return;
        }

        // Comment lines (": keep-alive") carry no fields.
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event_type = Some(value.to_string()),
            // id and retry are legal fields we have no use for.
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEAD EVENT STREAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Receiving half of a head-event subscription.
///
/// The stream ends (`next` returns `None`) when the remote closes the
/// connection or the cancellation token fires. Callers are expected to
/// re-subscribe after a delay.
#[derive(Debug)]
pub struct HeadEventStream {
    rx: mpsc::Receiver<HeadEvent>,
}

impl HeadEventStream {
    /// Spawn a reader task over an open SSE response.
    pub(crate) fn spawn(response: reqwest::Response, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(read_loop(response, tx, cancel));
        Self { rx }
    }

    /// Wait for the next head event.
    ///
    /// Returns `None` once the stream has terminated.
    pub async fn next(&mut self) -> Option<HeadEvent> {
        self.rx.recv().await
    }
}

/// Pump the HTTP byte stream through the parser until close or cancel.
async fn read_loop(
    response: reqwest::Response,
    tx: mpsc::Sender<HeadEvent>,
    cancel: CancellationToken,
) {
    let mut bytes = response.bytes_stream();
    let mut parser = SseParser::new();

    loop {
        let chunk = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Head stream cancelled");
                return;
            }
            chunk = bytes.next() => chunk,
        };

        let Some(chunk) = chunk else {
            debug!("Head stream closed by remote");
            return;
        };

        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Head stream read failed");
                return;
            }
        };

        for frame in parser.feed(&chunk) {
            // The subscription is head-only, but a node may still interleave
            // other event types; skip anything not explicitly head.
            if frame.event.as_deref().is_some_and(|event| event != "head") {
                continue;
            }

            match serde_json::from_str::<HeadFrame>(&frame.data).map(HeadEvent::try_from) {
                Ok(Ok(event)) => {
                    if tx.send(event).await.is_err() {
                        // Consumer dropped the stream.
                        return;
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "Skipping malformed head event"),
                Err(e) => warn!(error = %e, "Skipping undecodable head frame"),
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
