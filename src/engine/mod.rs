pub mod ledger;
pub mod lifecycle;
pub mod registry;
pub mod workers;

pub use ledger::{FrameEntry, FrameLedger};
pub use lifecycle::{attribute_completion, first_occurrence_wins, Lifecycle, Outcome};
pub use registry::{Mark, Registry, Session, SessionKey, Stream, StreamKey};
pub use workers::WorkerTracker;

use crate::classify::{Classifier, EventKind, FrameEvent};
use crate::source::entry::LogEntry;
use crate::source::reader::{LineReader, ReaderError};
use crate::source::timestamp::{Clock, Moment};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Keep every entry of the analysed module for the raw-entry and timeline reports
    pub retain_entries: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            retain_entries: true,
        }
    }
}

/// Counters describing how much of the log was understood.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub lines_read: u64,
    /// Lines of the analysed module
    pub entries: u64,
    /// Entries one of the shapes accepted
    pub events: u64,
    pub frames: u64,
    /// Lines that were not entries of the analysed module
    pub skipped: u64,
    /// Completion events no started stream could be found for
    pub orphans: u64,
    /// Repeated lifecycle events that did not overwrite the first one
    pub duplicates: u64,
    /// Streams that logged both a completion and a reset
    pub anomalies: u64,
}

/// Which layout the log was written in. Older httpd builds do not log scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSchema {
    WithScheduling,
    WithoutScheduling,
}

/// One retained entry of the analysed module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: Moment,
    pub entry: LogEntry,
    /// Set when one of the shapes accepted the message
    pub kind: Option<EventKind>,
    /// Stream the entry is about, resolved through task aliases
    pub stream: Option<StreamKey>,
}

/// State of one ingestion pass over a log. Everything the reports read lives
/// here; nothing is shared between runs.
#[derive(Debug)]
pub struct Analysis {
    classifier: Classifier,
    options: IngestOptions,
    clock: Clock,
    registry: Registry,
    workers: WorkerTracker,
    ledger: FrameLedger,
    journal: Vec<JournalEntry>,
    diagnostics: Diagnostics,
    saw_scheduled: bool,
    seq: u64,
}

impl Analysis {
    pub fn new(classifier: Classifier, options: IngestOptions) -> Self {
        Self {
            classifier,
            options,
            clock: Clock::new(),
            registry: Registry::new(),
            workers: WorkerTracker::new(),
            ledger: FrameLedger::new(),
            journal: Vec::new(),
            diagnostics: Diagnostics::default(),
            saw_scheduled: false,
            seq: 0,
        }
    }

    /// Analyse the log at `path` in a single pass.
    pub fn from_path(
        path: &Path,
        classifier: Classifier,
        options: IngestOptions,
    ) -> Result<Self, ReaderError> {
        info!(path = %path.display(), module = classifier.module(), "Analysing log");
        let mut reader = LineReader::open(path)?;
        let mut analysis = Self::new(classifier, options);
        analysis.ingest(&mut reader)?;
        Ok(analysis)
    }

    /// Feed every remaining line of `reader`. A read or encoding error stops the pass.
    pub fn ingest<R: BufRead>(&mut self, reader: &mut LineReader<R>) -> Result<(), ReaderError> {
        for line in reader.by_ref() {
            let line = line?;
            self.ingest_line(line.line_no, &line.text);
        }
        self.finish(reader.offset());
        Ok(())
    }

    /// Process one line. Lines that are not entries of the analysed module are skipped.
    pub fn ingest_line(&mut self, line_no: u64, line: &str) {
        self.diagnostics.lines_read += 1;

        let Some(entry) = self.classifier.parse_entry(line_no, line) else {
            self.diagnostics.skipped += 1;
            debug!(line_no, "Skipping line");
            return;
        };
        self.diagnostics.entries += 1;

        self.seq += 1;
        let seq = self.seq;
        let at = self.clock.moment(entry.time);

        let kind = self.classifier.classify(&entry);
        let stream = match &kind {
            Some(kind) => {
                self.diagnostics.events += 1;
                self.apply(seq, at, &entry, kind)
            }
            None => self
                .classifier
                .stream_reference(&entry.message)
                .map(|(session, stream)| {
                    self.registry
                        .resolve(StreamKey::new(entry.pid, session, stream))
                }),
        };

        if self.options.retain_entries {
            self.journal.push(JournalEntry {
                seq,
                at,
                entry,
                kind,
                stream,
            });
        }
    }

    fn apply(&mut self, seq: u64, at: Moment, entry: &LogEntry, kind: &EventKind) -> Option<StreamKey> {
        if matches!(kind, EventKind::StreamScheduled { .. }) {
            self.saw_scheduled = true;
        }

        let outcome =
            Lifecycle::new(&mut self.registry, &mut self.workers).apply(entry.pid, seq, at, kind);
        match outcome {
            Outcome::NotLifecycle => {
                return match kind {
                    EventKind::FrameRecv(frame) | EventKind::FrameSent(frame) => {
                        self.record_frame(seq, at, entry, kind, frame)
                    }
                    _ => None,
                };
            }
            Outcome::Duplicate(_) => self.diagnostics.duplicates += 1,
            Outcome::Orphan => self.diagnostics.orphans += 1,
            Outcome::Recorded(key)
                if matches!(
                    kind,
                    EventKind::RequestDone { .. } | EventKind::StreamReset { .. }
                ) =>
            {
                if self.registry.stream(&key).is_some_and(Stream::is_anomalous) {
                    warn!(stream = %key, line_no = entry.line_no, "Stream logged both a completion and a reset");
                }
            }
            Outcome::Recorded(_) | Outcome::Updated(_) => {}
        }
        outcome.stream()
    }

    fn record_frame(
        &mut self,
        seq: u64,
        at: Moment,
        entry: &LogEntry,
        kind: &EventKind,
        frame: &FrameEvent,
    ) -> Option<StreamKey> {
        let direction = kind.direction()?;
        let session = SessionKey::new(entry.pid, frame.session);
        let index = self.ledger.record(FrameEntry {
            seq,
            at,
            session,
            direction,
            event: frame.clone(),
            entry: entry.clone(),
        });
        self.diagnostics.frames += 1;

        let record = self.registry.session_mut(session);
        record.frames.push(index);
        if let Some(state) = &frame.session_state {
            record.state = Some(state.clone());
        }
        if let Some(open) = frame.open_streams {
            record.open_streams = Some(open);
        }
        if let Some(counters) = frame.counters {
            record.counters = Some(counters);
        }

        frame
            .frame
            .stream_id
            .map(|id| self.registry.resolve(session.stream(id)))
    }

    fn finish(&mut self, bytes: u64) {
        self.diagnostics.anomalies = self
            .registry
            .streams()
            .filter(|s| s.is_anomalous())
            .count() as u64;

        let d = &self.diagnostics;
        info!(
            bytes,
            lines = d.lines_read,
            entries = d.entries,
            events = d.events,
            frames = d.frames,
            streams = self.registry.stream_count(),
            complete = self.registry.streams().filter(|s| s.is_complete()).count(),
            sessions = self.registry.sessions().count(),
            aliases = self.registry.alias_count(),
            orphans = d.orphans,
            anomalies = d.anomalies,
            "Analysis complete"
        );
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn workers(&self) -> &WorkerTracker {
        &self.workers
    }

    pub fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    /// Retained entries in log order; empty when retention is off.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn schema(&self) -> LogSchema {
        if self.saw_scheduled {
            LogSchema::WithScheduling
        } else {
            LogSchema::WithoutScheduling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn line(micros: u32, pid: u32, message: &str) -> String {
        format!(
            "[2020-10-14 10:00:00.{micros:06}] [http2:debug] [pid {pid}:tid 7] h2_stream.c(1): {message}\n"
        )
    }

    fn run(text: &str, options: IngestOptions) -> Analysis {
        let mut analysis = Analysis::new(Classifier::new(), options);
        let mut reader = LineReader::new(Cursor::new(text.as_bytes().to_vec()));
        analysis.ingest(&mut reader).unwrap();
        analysis
    }

    #[test]
    fn test_ingest_builds_streams_and_counts() {
        let text = [
            line(0, 1, "AH03082: h2_stream(1-1,IDLE): created"),
            line(10, 1, "h2_stream(1-1,OPEN): schedule GET https://h/ chunked=0"),
            line(20, 1, "h2_task(1-1): process connection"),
            line(30, 1, "h2_mplx(1): request done, 0.5 ms elapsed"),
            line(40, 1, "h2_mplx(1): request done, 0.5 ms elapsed"),
            "not a log line\n".to_string(),
            "[2020-10-14 10:00:00.000050] [core:debug] [pid 1] nothing\n".to_string(),
        ]
        .concat();
        let analysis = run(&text, IngestOptions::default());

        let s = analysis.registry().stream(&StreamKey::new(1, 1, 1)).unwrap();
        assert_eq!(s.request.as_ref().unwrap().to_string(), "GET https://h/");
        assert_eq!(s.ended.unwrap().at.elapsed, chrono::Duration::microseconds(30));
        assert_eq!(s.elapsed_ms, Some(0.5));

        let d = analysis.diagnostics();
        assert_eq!(d.lines_read, 7);
        assert_eq!(d.entries, 5);
        assert_eq!(d.events, 5);
        assert_eq!(d.skipped, 2);
        assert_eq!(d.orphans, 1);
        assert_eq!(analysis.schema(), LogSchema::WithScheduling);
        assert_eq!(analysis.journal().len(), 5);
    }

    #[test]
    fn test_schema_without_scheduling() {
        let analysis = run(&line(0, 1, "h2_stream(1-1,IDLE): created"), IngestOptions::default());
        assert_eq!(analysis.schema(), LogSchema::WithoutScheduling);
    }

    #[test]
    fn test_frames_update_session_and_ledger() {
        let text = [
            line(0, 2, "h2_session(4,IDLE,0): recv FRAME[SETTINGS[length=6, stream=0]], frames=1/0 (r/s)"),
            line(5, 2, "h2_session(4,BUSY,1): sent FRAME[HEADERS[length=30, hend=1, stream=1, eos=0]], frames=1/2 (r/s)"),
        ]
        .concat();
        let analysis = run(&text, IngestOptions::default());

        assert_eq!(analysis.ledger().len(), 2);
        let session = analysis.registry().session(&SessionKey::new(2, 4)).unwrap();
        assert_eq!(session.frames, vec![0, 1]);
        assert_eq!(session.state.as_deref(), Some("BUSY"));
        assert_eq!(session.open_streams, Some(1));
        assert_eq!(session.counters.unwrap().sent, 2);
        assert_eq!(analysis.journal()[1].stream, Some(StreamKey::new(2, 4, 1)));
        // Frames never create stream records
        assert_eq!(analysis.registry().stream_count(), 0);
    }

    #[test]
    fn test_unclassified_entry_keeps_stream_reference() {
        let text = line(0, 3, "h2_stream(1-5,OPEN): send_headers");
        let analysis = run(&text, IngestOptions::default());
        let entry = &analysis.journal()[0];
        assert!(entry.kind.is_none());
        assert_eq!(entry.stream, Some(StreamKey::new(3, 1, 5)));
        assert_eq!(analysis.diagnostics().events, 0);
    }

    #[test]
    fn test_retention_off_keeps_no_journal() {
        let text = line(0, 1, "h2_stream(1-1,IDLE): created");
        let analysis = run(
            &text,
            IngestOptions {
                retain_entries: false,
            },
        );
        assert!(analysis.journal().is_empty());
        assert_eq!(analysis.registry().stream_count(), 1);
    }

    #[test]
    fn test_anomaly_is_counted() {
        let text = [
            line(0, 1, "h2_task(1-1): process connection"),
            line(1, 1, "h2_stream(1-1,OPEN): RST_STREAM 2"),
            line(2, 1, "h2_mplx(1): request done, 1 ms elapsed"),
        ]
        .concat();
        let analysis = run(&text, IngestOptions::default());
        assert_eq!(analysis.diagnostics().anomalies, 1);
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let mut bytes = line(0, 1, "h2_stream(1-1,IDLE): created").into_bytes();
        bytes.extend_from_slice(b"[\xff\xfe]\n");
        let mut analysis = Analysis::new(Classifier::new(), IngestOptions::default());
        let mut reader = LineReader::new(Cursor::new(bytes));
        let err = analysis.ingest(&mut reader).unwrap_err();
        assert!(matches!(err, ReaderError::Encoding { line_no: 2, .. }));
        assert_eq!(analysis.registry().stream_count(), 1);
    }
}
