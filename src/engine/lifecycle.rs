//! Applies classified events to stream records.
//!
//! Two rules resolve ambiguity in the log:
//! - [`first_occurrence_wins`]: httpd logs the same transition at several trace
//!   levels, so only the first sighting of each lifecycle event is recorded.
//! - [`attribute_completion`]: `request done` lines carry the session, so they
//!   are matched to an in-flight stream of that session.

use crate::classify::EventKind;
use crate::classify::StreamState;
use crate::engine::registry::{Mark, Registry, SessionKey, StreamKey};
use crate::engine::workers::WorkerTracker;
use crate::source::timestamp::Moment;
use tracing::debug;

/// What applying one event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A lifecycle field of the stream was set
    Recorded(StreamKey),
    /// The stream already had this field; nothing changed
    Duplicate(StreamKey),
    /// The event updated the stream without setting a timestamp (e.g. a state change)
    Updated(StreamKey),
    /// No stream could be attributed; the event was dropped
    Orphan,
    /// Frame events are handled by the ledger
    NotLifecycle,
}

impl Outcome {
    pub fn stream(&self) -> Option<StreamKey> {
        match self {
            Outcome::Recorded(k) | Outcome::Duplicate(k) | Outcome::Updated(k) => Some(*k),
            Outcome::Orphan | Outcome::NotLifecycle => None,
        }
    }
}

/// Set `slot` unless it already holds a mark. Returns true when it was set.
pub fn first_occurrence_wins(slot: &mut Option<Mark>, mark: Mark) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(mark);
    true
}

/// Pick the stream a completion event of `session` belongs to.
///
/// With a stream number, that stream (through task aliases) if a worker is on
/// it. Without, every in-flight stream of the session is a candidate and the
/// lowest stream number wins; httpd numbers streams in the order they open.
pub fn attribute_completion(
    registry: &mut Registry,
    session: SessionKey,
    stream: Option<u32>,
) -> Option<StreamKey> {
    if let Some(number) = stream {
        let key = registry.resolve(session.stream(number));
        return registry
            .stream(&key)
            .filter(|s| s.in_flight())
            .map(|s| s.key);
    }

    registry
        .in_flight(session)
        .into_iter()
        .map(|s| s.key)
        .min_by_key(|k| k.stream)
}

/// Applies events to the registry and keeps worker counts in step.
pub struct Lifecycle<'a> {
    registry: &'a mut Registry,
    workers: &'a mut WorkerTracker,
}

impl<'a> Lifecycle<'a> {
    pub fn new(registry: &'a mut Registry, workers: &'a mut WorkerTracker) -> Self {
        Self { registry, workers }
    }

    /// Apply one event logged by process `pid` at `at`, journal sequence `seq`.
    pub fn apply(&mut self, pid: u32, seq: u64, at: Moment, kind: &EventKind) -> Outcome {
        let session = SessionKey::new(pid, kind.session());
        let mark = Mark {
            at,
            workers: self.workers.snapshot(pid),
        };

        match kind {
            EventKind::StreamCreated { stream, .. } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                if record.state.is_none() {
                    record.state = Some(StreamState::Idle);
                }
                recorded(record.key, first_occurrence_wins(&mut record.created, mark))
            }
            EventKind::StreamStateEntered { stream, state, .. } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                record.state = Some(*state);
                if *state == StreamState::Idle {
                    recorded(record.key, first_occurrence_wins(&mut record.created, mark))
                } else {
                    Outcome::Updated(record.key)
                }
            }
            EventKind::StreamScheduled {
                stream, request, ..
            } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                let set = first_occurrence_wins(&mut record.scheduled, mark);
                if set {
                    record.request = Some(request.clone());
                }
                recorded(record.key, set)
            }
            EventKind::StreamReset {
                stream, error_code, ..
            } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                let set = first_occurrence_wins(&mut record.reset, mark);
                if set {
                    record.reset_code = *error_code;
                }
                recorded(record.key, set)
            }
            EventKind::StreamCleanup { stream, .. } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                recorded(record.key, first_occurrence_wins(&mut record.cleanup, mark))
            }
            EventKind::StreamDestroyed { stream, .. } => {
                let record = self.registry.stream_mut(session.stream(*stream), at, seq);
                recorded(record.key, first_occurrence_wins(&mut record.destroyed, mark))
            }
            EventKind::TaskProcessStart { stream, .. } => {
                let key = self.registry.resolve_task(session.stream(*stream));
                let record = self.registry.stream_mut(key, at, seq);
                // The snapshot counts the other busy workers, taken before this one starts
                let set = first_occurrence_wins(&mut record.started, mark);
                if set {
                    self.workers.on_start(pid);
                    self.registry.mark_in_flight(session, key);
                    self.registry.mark_in_flight(key.session_key(), key);
                }
                recorded(key, set)
            }
            EventKind::RequestDone {
                stream, elapsed_ms, ..
            } => {
                let Some(key) = attribute_completion(self.registry, session, *stream) else {
                    debug!(session = %session, stream = ?stream, "Completion without a started stream");
                    return Outcome::Orphan;
                };
                let Some(record) = self.registry.existing_stream_mut(&key) else {
                    return Outcome::Orphan;
                };
                if record.ended.is_some() {
                    return Outcome::Duplicate(key);
                }
                // This worker is free again; the snapshot counts the ones still busy
                self.workers.on_end(pid);
                record.ended = Some(Mark {
                    at,
                    workers: self.workers.snapshot(pid),
                });
                record.elapsed_ms = Some(*elapsed_ms);
                Outcome::Recorded(key)
            }
            EventKind::FrameRecv(_) | EventKind::FrameSent(_) => Outcome::NotLifecycle,
        }
    }
}

fn recorded(key: StreamKey, set: bool) -> Outcome {
    if set {
        Outcome::Recorded(key)
    } else {
        Outcome::Duplicate(key)
    }
}
