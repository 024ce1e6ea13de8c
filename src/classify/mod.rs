pub mod frame;
pub mod shapes;

pub use frame::{FrameDescriptor, FrameType};
pub use shapes::{builtin_shapes, Shape};

use crate::source::entry::{EntryParser, LogEntry};
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Module tag of the HTTP/2 lines in an httpd error log
pub const DEFAULT_MODULE: &str = "http2";

/// HTTP/2 stream states as mod_http2 names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
    HalfClosedLocal,
    Closed,
    Cleanup,
}

impl StreamState {
    /// Accepts both the long names and the abbreviated ones httpd logs.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "IDLE" => Some(StreamState::Idle),
            "OPEN" => Some(StreamState::Open),
            "HALF_CLOSED_REMOTE" | "HALF_CLOSED_R" => Some(StreamState::HalfClosedRemote),
            "HALF_CLOSED_LOCAL" | "HALF_CLOSED_L" => Some(StreamState::HalfClosedLocal),
            "CLOSED" => Some(StreamState::Closed),
            "CLEANUP" => Some(StreamState::Cleanup),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamState::Idle => "IDLE",
            StreamState::Open => "OPEN",
            StreamState::HalfClosedRemote => "HALF_CLOSED_REMOTE",
            StreamState::HalfClosedLocal => "HALF_CLOSED_LOCAL",
            StreamState::Closed => "CLOSED",
            StreamState::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Method and URL of a scheduled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestLine {
    pub method: String,
    pub url: String,
    pub chunked: bool,
}

impl fmt::Display for RequestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Running frame counters as reported in `frames=<r>/<s> (r/s)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameCounters {
    pub received: u64,
    pub sent: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

/// A frame sent or received on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameEvent {
    pub session: u64,
    /// Session state label, e.g. `BUSY`
    pub session_state: Option<String>,
    /// Stream count httpd reports next to the state
    pub open_streams: Option<u32>,
    pub frame: FrameDescriptor,
    pub counters: Option<FrameCounters>,
}

/// What a classified log line says happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    StreamCreated {
        session: u64,
        stream: u32,
    },
    StreamStateEntered {
        session: u64,
        stream: u32,
        state: StreamState,
    },
    StreamScheduled {
        session: u64,
        stream: u32,
        request: RequestLine,
    },
    StreamReset {
        session: u64,
        stream: u32,
        error_code: Option<u32>,
    },
    StreamCleanup {
        session: u64,
        stream: u32,
    },
    StreamDestroyed {
        session: u64,
        stream: u32,
    },
    TaskProcessStart {
        session: u64,
        stream: u32,
    },
    /// Carries the session; the stream number is only present in some builds
    RequestDone {
        session: u64,
        stream: Option<u32>,
        elapsed_ms: f64,
    },
    FrameRecv(FrameEvent),
    FrameSent(FrameEvent),
}

impl EventKind {
    pub fn session(&self) -> u64 {
        match self {
            EventKind::StreamCreated { session, .. }
            | EventKind::StreamStateEntered { session, .. }
            | EventKind::StreamScheduled { session, .. }
            | EventKind::StreamReset { session, .. }
            | EventKind::StreamCleanup { session, .. }
            | EventKind::StreamDestroyed { session, .. }
            | EventKind::TaskProcessStart { session, .. }
            | EventKind::RequestDone { session, .. } => *session,
            EventKind::FrameRecv(f) | EventKind::FrameSent(f) => f.session,
        }
    }

    /// Stream number named by the event itself, if any.
    pub fn stream(&self) -> Option<u32> {
        match self {
            EventKind::StreamCreated { stream, .. }
            | EventKind::StreamStateEntered { stream, .. }
            | EventKind::StreamScheduled { stream, .. }
            | EventKind::StreamReset { stream, .. }
            | EventKind::StreamCleanup { stream, .. }
            | EventKind::StreamDestroyed { stream, .. }
            | EventKind::TaskProcessStart { stream, .. } => Some(*stream),
            EventKind::RequestDone { stream, .. } => *stream,
            EventKind::FrameRecv(f) | EventKind::FrameSent(f) => f.frame.stream_id,
        }
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, EventKind::FrameRecv(_) | EventKind::FrameSent(_))
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            EventKind::FrameRecv(_) => Some(Direction::Received),
            EventKind::FrameSent(_) => Some(Direction::Sent),
            _ => None,
        }
    }
}

/// A classified log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub kind: EventKind,
}

/// Turns raw lines into [`LogEvent`]s. Holds no state between lines.
#[derive(Debug)]
pub struct Classifier {
    module: String,
    entries: EntryParser,
    shapes: Vec<Shape>,
    stream_ref: Regex,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::for_module(DEFAULT_MODULE)
    }

    /// Classifier that only accepts lines tagged with `module`
    pub fn for_module(module: impl Into<String>) -> Self {
        let stream_ref = Regex::new(
            r"^(?:AH\d+: )?h2_(?:mplx|session|stream|task)\((?P<session>\d+)-(?P<stream>\d+)",
        )
        .expect("built-in stream reference pattern must compile");

        Self {
            module: module.into(),
            entries: EntryParser::new(),
            shapes: builtin_shapes(),
            stream_ref,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Parse the header of a line of the analysed module.
    pub fn parse_entry(&self, line_no: u64, line: &str) -> Option<LogEntry> {
        self.entries
            .parse(line_no, line)
            .filter(|entry| entry.module == self.module)
    }

    /// Match the message against every shape; the first that accepts it wins.
    pub fn classify(&self, entry: &LogEntry) -> Option<EventKind> {
        self.shapes
            .iter()
            .find_map(|shape| shape.matches(&entry.message))
    }

    pub fn classify_line(&self, line_no: u64, line: &str) -> Option<LogEvent> {
        let entry = self.parse_entry(line_no, line)?;
        let kind = self.classify(&entry)?;
        Some(LogEvent { entry, kind })
    }

    /// `(session, stream)` named by a message none of the shapes accepted,
    /// e.g. `h2_stream(1-3,OPEN): send_headers`.
    pub fn stream_reference(&self, message: &str) -> Option<(u64, u32)> {
        let caps = self.stream_ref.captures(message)?;
        Some((caps["session"].parse().ok()?, caps["stream"].parse().ok()?))
    }
}
