use crate::classify::{FrameCounters, RequestLine, StreamState};
use crate::source::timestamp::Moment;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// `(process, session, stream)`; renders as `pid-session-stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamKey {
    pub pid: u32,
    pub session: u64,
    pub stream: u32,
}

impl StreamKey {
    pub fn new(pid: u32, session: u64, stream: u32) -> Self {
        Self {
            pid,
            session,
            stream,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey {
            pid: self.pid,
            session: self.session,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.pid, self.session, self.stream)
    }
}

/// `(process, session)`; renders as `pid-session`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionKey {
    pub pid: u32,
    pub session: u64,
}

impl SessionKey {
    pub fn new(pid: u32, session: u64) -> Self {
        Self { pid, session }
    }

    pub fn stream(&self, stream: u32) -> StreamKey {
        StreamKey::new(self.pid, self.session, stream)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.pid, self.session)
    }
}

/// When a lifecycle event was first seen, and how many other workers of the
/// process were busy at that moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mark {
    pub at: Moment,
    pub workers: u32,
}

/// Lifecycle record of one HTTP/2 stream. Fields stay None until the matching
/// event is observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    pub key: StreamKey,
    /// Moment of the first event that referenced this stream
    pub first_seen: Moment,
    /// Journal sequence number of that event
    pub first_seen_seq: u64,
    pub created: Option<Mark>,
    pub scheduled: Option<Mark>,
    pub started: Option<Mark>,
    pub ended: Option<Mark>,
    pub reset: Option<Mark>,
    pub cleanup: Option<Mark>,
    pub destroyed: Option<Mark>,
    pub request: Option<RequestLine>,
    pub reset_code: Option<u32>,
    pub state: Option<StreamState>,
    /// Elapsed time httpd reported with the completion event
    pub elapsed_ms: Option<f64>,
}

impl Stream {
    fn new(key: StreamKey, first_seen: Moment, first_seen_seq: u64) -> Self {
        Self {
            key,
            first_seen,
            first_seen_seq,
            created: None,
            scheduled: None,
            started: None,
            ended: None,
            reset: None,
            cleanup: None,
            destroyed: None,
            request: None,
            reset_code: None,
            state: None,
            elapsed_ms: None,
        }
    }

    /// Moment reports sort and window on: creation, or first sighting if the
    /// creation was never logged.
    pub fn origin(&self) -> Moment {
        self.created.map(|m| m.at).unwrap_or(self.first_seen)
    }

    pub fn workers_busy_at_start(&self) -> Option<u32> {
        self.started.map(|m| m.workers)
    }

    pub fn workers_busy_at_end(&self) -> Option<u32> {
        self.ended.map(|m| m.workers)
    }

    /// A worker picked it up and has not finished yet.
    pub fn in_flight(&self) -> bool {
        self.started.is_some() && self.ended.is_none()
    }

    /// Both a normal completion and a reset were logged.
    pub fn is_anomalous(&self) -> bool {
        self.ended.is_some() && self.reset.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.started.is_some()
            && (self.ended.is_some() || self.reset.is_some())
            && self.cleanup.is_some()
            && self.destroyed.is_some()
    }
}

/// Per-connection record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    /// Last state label reported by a frame line, e.g. `BUSY`
    pub state: Option<String>,
    /// Stream count reported next to the state
    pub open_streams: Option<u32>,
    /// Last reported `frames=r/s` counters
    pub counters: Option<FrameCounters>,
    /// Indices into the frame ledger, in arrival order
    #[serde(skip)]
    pub frames: Vec<usize>,
    /// Streams of this session a worker started and has not finished, in start order
    #[serde(skip)]
    pub in_flight: Vec<StreamKey>,
}

/// Owns every stream and session record of an analysis run.
#[derive(Debug, Default)]
pub struct Registry {
    streams: HashMap<StreamKey, Stream>,
    sessions: HashMap<SessionKey, Session>,
    /// Task ids that turned out to name a stream under a different session
    aliases: HashMap<StreamKey, StreamKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow a task alias to the stream it stands for.
    pub fn resolve(&self, key: StreamKey) -> StreamKey {
        self.aliases.get(&key).copied().unwrap_or(key)
    }

    pub fn stream(&self, key: &StreamKey) -> Option<&Stream> {
        self.streams.get(&self.resolve(*key))
    }

    /// Get or create a stream record.
    pub fn stream_mut(&mut self, key: StreamKey, at: Moment, seq: u64) -> &mut Stream {
        let key = self.resolve(key);
        self.streams
            .entry(key)
            .or_insert_with(|| Stream::new(key, at, seq))
    }

    pub fn existing_stream_mut(&mut self, key: &StreamKey) -> Option<&mut Stream> {
        let key = self.resolve(*key);
        self.streams.get_mut(&key)
    }

    pub fn session(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    /// Get or create a session record.
    pub fn session_mut(&mut self, key: SessionKey) -> &mut Session {
        self.sessions.entry(key).or_default()
    }

    /// Resolve the key a task names. Some httpd builds give tasks a different
    /// session number than the main connection; when the key is unknown and
    /// exactly one not-yet-started stream of the same process carries the same
    /// stream number, the key becomes an alias of that stream.
    pub fn resolve_task(&mut self, key: StreamKey) -> StreamKey {
        let key = self.resolve(key);
        if self.streams.contains_key(&key) {
            return key;
        }

        let candidates: Vec<StreamKey> = self
            .streams
            .values()
            .filter(|s| s.key.pid == key.pid && s.key.stream == key.stream && s.started.is_none())
            .map(|s| s.key)
            .collect();

        match candidates.as_slice() {
            [] => key,
            [target] => {
                debug!(task = %key, stream = %target, "Task attached to stream");
                self.aliases.insert(key, *target);
                *target
            }
            many => {
                warn!(
                    task = %key,
                    candidates = many.len(),
                    "Task matches several streams, not attaching"
                );
                key
            }
        }
    }

    /// Remember that a worker started `key` on behalf of `session`.
    pub fn mark_in_flight(&mut self, session: SessionKey, key: StreamKey) {
        let in_flight = &mut self.session_mut(session).in_flight;
        if !in_flight.contains(&key) {
            in_flight.push(key);
        }
    }

    /// Streams of `session` that are started and not yet ended, in start order.
    /// Entries that have since ended are dropped from the session's list.
    pub fn in_flight(&mut self, session: SessionKey) -> Vec<&Stream> {
        let streams = &self.streams;
        let Some(record) = self.sessions.get_mut(&session) else {
            return Vec::new();
        };
        record
            .in_flight
            .retain(|k| streams.get(k).is_some_and(Stream::in_flight));
        record
            .in_flight
            .iter()
            .filter_map(|k| streams.get(k))
            .collect()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.values()
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&SessionKey, &Session)> {
        self.sessions.iter()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Streams ordered by origin moment, then by first sighting in the log.
    pub fn streams_sorted(&self) -> Vec<&Stream> {
        let mut streams: Vec<&Stream> = self.streams.values().collect();
        streams.sort_by(|a, b| {
            a.origin()
                .elapsed
                .cmp(&b.origin().elapsed)
                .then(a.first_seen_seq.cmp(&b.first_seen_seq))
        });
        streams
    }
}
