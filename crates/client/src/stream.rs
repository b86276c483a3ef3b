use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::model::{ProgressEvent, SchedulingResult};

/// Marker that starts every event line of the progress feed.
pub const EVENT_PREFIX: &str = "data:";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("Connection error during processing: {0}")]
    Transport(String),
    #[error("connection closed unexpectedly")]
    ClosedUnexpectedly,
    /// Message carried by an `error` event.
    #[error("{0}")]
    Server(String),
    #[error("Processing cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Line decoding
// ---------------------------------------------------------------------------

/// Longest line held while waiting for its newline. A `complete` event
/// carries the whole timetable, so this is generous.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Reassembles lines from arbitrarily split chunks. Bytes are held until a
/// newline arrives, so a multi-byte character split across chunks survives.
/// A line longer than `max_line` is dropped up to its newline.
#[derive(Debug)]
struct LineDecoder {
    pending: Vec<u8>,
    max_line: usize,
    /// Inside an oversized line whose head was already discarded.
    skipping: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        LineDecoder::with_limit(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    fn with_limit(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_line,
            skipping: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;
        // Only the new bytes can hold a newline not seen yet.
        for (i, byte) in chunk.iter().enumerate() {
            if *byte != b'\n' {
                continue;
            }
            if self.skipping {
                self.skipping = false;
            } else {
                self.pending.extend_from_slice(&chunk[start..i]);
                lines.push(decode_line(&self.pending));
            }
            self.pending.clear();
            start = i + 1;
        }

        if !self.skipping {
            self.pending.extend_from_slice(&chunk[start..]);
            if self.pending.len() > self.max_line {
                warn!(
                    "dropping progress line longer than {} bytes",
                    self.max_line
                );
                self.pending.clear();
                self.skipping = true;
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.skipping || self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches('\r').to_string()
}

/// Parse one line of the feed. Lines without the event marker are skipped;
/// marked lines that fail to decode are logged and skipped.
pub fn parse_event_line(line: &str) -> Option<ProgressEvent> {
    let payload = line.strip_prefix(EVENT_PREFIX)?.trim_start();
    match serde_json::from_str::<ProgressEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("ignoring undecodable progress line {:?}: {}", line, e);
            None
        }
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: LineDecoder,
    ready: VecDeque<ProgressEvent>,
    finished: bool,
}

/// Turn a chunked response body into a lazy, finite stream of progress
/// events. A transport error is yielded once and ends the stream.
pub fn decode_events<S, B, E>(body: S) -> impl Stream<Item = Result<ProgressEvent, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: LineDecoder::default(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.ready.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let events = state
                        .decoder
                        .push(chunk.as_ref())
                        .iter()
                        .filter_map(|line| parse_event_line(line))
                        .collect::<Vec<_>>();
                    state.ready.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(StreamError::Transport(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    if let Some(event) = state.decoder.finish().as_deref().and_then(parse_event_line) {
                        state.ready.push_back(event);
                    }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Progress state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderState {
    Idle,
    Streaming,
    Completed(SchedulingResult),
    Failed(String),
}

/// Observable progress: bar percentage plus status text.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub message: String,
}

/// Drives `Idle -> Streaming -> {Completed, Failed}` from a progress feed.
#[derive(Debug)]
pub struct ProgressStreamReader {
    state: ReaderState,
    /// Taken from the snapshot the job was submitted with.
    max_generations: u32,
    current: ProgressUpdate,
    updates: Option<UnboundedSender<ProgressUpdate>>,
}

impl ProgressStreamReader {
    pub fn new(max_generations: u32) -> Self {
        Self {
            state: ReaderState::Idle,
            max_generations,
            current: ProgressUpdate {
                percent: 0.0,
                message: String::new(),
            },
            updates: None,
        }
    }

    /// Forward every progress change to `tx`.
    pub fn with_updates(mut self, tx: UnboundedSender<ProgressUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    pub fn progress(&self) -> &ProgressUpdate {
        &self.current
    }

    fn set_progress(&mut self, percent: f64, message: String) {
        self.current = ProgressUpdate { percent, message };
        if let Some(tx) = &self.updates {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(self.current.clone());
        }
    }

    fn fail(&mut self, err: StreamError) -> StreamError {
        self.state = ReaderState::Failed(err.to_string());
        err
    }

    /// Apply one event. Returns the outcome once a terminal event arrives.
    pub fn dispatch(
        &mut self,
        event: ProgressEvent,
    ) -> Option<Result<SchedulingResult, StreamError>> {
        match event {
            ProgressEvent::Progress { progress, message } => {
                self.set_progress(progress, message);
                None
            }
            ProgressEvent::Generation { generation, fitness } => {
                let percent = if self.max_generations == 0 {
                    100.0
                } else {
                    f64::from(generation) * 100.0 / f64::from(self.max_generations)
                };
                self.set_progress(
                    percent,
                    format!("Generation {}: Best fitness {:.4}", generation, fitness),
                );
                None
            }
            ProgressEvent::Complete { result } => {
                debug!("job completed with {} scheduled sessions", result.schedule.len());
                self.state = ReaderState::Completed(result.clone());
                Some(Ok(result))
            }
            ProgressEvent::Error { message } => Some(Err(self.fail(StreamError::Server(message)))),
        }
    }

    /// Read `events` until a terminal event, end of data, a transport error,
    /// or `shutdown` resolves. Whatever happens, the reader ends in
    /// `Completed` or `Failed` and the event stream is dropped.
    pub async fn consume<S, F>(
        &mut self,
        events: S,
        shutdown: F,
    ) -> Result<SchedulingResult, StreamError>
    where
        S: Stream<Item = Result<ProgressEvent, StreamError>>,
        F: Future<Output = ()>,
    {
        self.state = ReaderState::Streaming;
        futures::pin_mut!(events);
        tokio::pin!(shutdown);

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => return Err(self.fail(StreamError::Cancelled)),
                next = events.next() => next,
            };
            match next {
                Some(Ok(event)) => {
                    if let Some(outcome) = self.dispatch(event) {
                        return outcome;
                    }
                }
                Some(Err(e)) => return Err(self.fail(e)),
                None => {
                    warn!("progress stream ended without a terminal event");
                    return Err(self.fail(StreamError::ClosedUnexpectedly));
                }
            }
        }
    }
}
