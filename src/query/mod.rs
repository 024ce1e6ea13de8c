//! Read-only reports over a finished [`Analysis`].

pub mod filter;

pub use filter::{FilterError, IdPattern, StreamFilter, TimeWindow};

use crate::classify::{RequestLine, StreamState};
use crate::engine::{Analysis, FrameEntry, JournalEntry, LogSchema, Mark, Stream, StreamKey};
use crate::source::timestamp::{serialize_delta, LogTime, Moment};
use chrono::Duration;
use serde::Serialize;

/// Lifecycle columns of the stream summary, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Scheduled,
    Started,
    Ended,
    Reset,
    Cleanup,
    Destroyed,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Scheduled,
        Column::Started,
        Column::Ended,
        Column::Reset,
        Column::Cleanup,
        Column::Destroyed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Column::Scheduled => "scheduled",
            Column::Started => "started",
            Column::Ended => "ended",
            Column::Reset => "reset",
            Column::Cleanup => "cleanup",
            Column::Destroyed => "destroyed",
        }
    }

    /// Columns shown for a log of the given schema.
    pub fn for_schema(schema: LogSchema) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|c| *c != Column::Scheduled || schema == LogSchema::WithScheduling)
            .collect()
    }
}

/// A lifecycle event relative to the stream's creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cell {
    #[serde(serialize_with = "serialize_delta")]
    pub delta: Duration,
    /// Other workers of the process busy at that moment
    pub workers: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRow {
    pub id: StreamKey,
    /// Time of the creation event as logged; None if creation was never seen
    pub created: Option<LogTime>,
    /// Deltas are measured from here
    pub origin: Moment,
    pub scheduled: Option<Cell>,
    pub started: Option<Cell>,
    pub ended: Option<Cell>,
    pub reset: Option<Cell>,
    pub cleanup: Option<Cell>,
    pub destroyed: Option<Cell>,
    pub request: Option<RequestLine>,
    pub state: Option<StreamState>,
    pub reset_code: Option<u32>,
    pub elapsed_ms: Option<f64>,
    pub anomalous: bool,
}

impl StreamRow {
    fn from_stream(stream: &Stream) -> Self {
        let origin = stream.origin();
        let cell = |mark: Option<Mark>| {
            mark.map(|m| Cell {
                delta: m.at.elapsed - origin.elapsed,
                workers: m.workers,
            })
        };

        Self {
            id: stream.key,
            created: stream.created.map(|m| m.at.time),
            origin,
            scheduled: cell(stream.scheduled),
            started: cell(stream.started),
            ended: cell(stream.ended),
            reset: cell(stream.reset),
            cleanup: cell(stream.cleanup),
            destroyed: cell(stream.destroyed),
            request: stream.request.clone(),
            state: stream.state,
            reset_code: stream.reset_code,
            elapsed_ms: stream.elapsed_ms,
            anomalous: stream.is_anomalous(),
        }
    }

    pub fn cell(&self, column: Column) -> Option<&Cell> {
        match column {
            Column::Scheduled => self.scheduled.as_ref(),
            Column::Started => self.started.as_ref(),
            Column::Ended => self.ended.as_ref(),
            Column::Reset => self.reset.as_ref(),
            Column::Cleanup => self.cleanup.as_ref(),
            Column::Destroyed => self.destroyed.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSummary {
    pub total: usize,
    pub schema: LogSchema,
    pub rows: Vec<StreamRow>,
}

/// Streams matching `filter` whose origin falls in `window`, ordered by
/// creation and then by first appearance in the log.
pub fn summary(analysis: &Analysis, filter: &StreamFilter, window: &TimeWindow) -> StreamSummary {
    let rows: Vec<StreamRow> = analysis
        .registry()
        .streams_sorted()
        .into_iter()
        .filter(|s| filter.matches(&s.key) && window.contains(s.origin().elapsed))
        .map(StreamRow::from_stream)
        .collect();

    StreamSummary {
        total: rows.len(),
        schema: analysis.schema(),
        rows,
    }
}

/// Selection for the raw entry listing.
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub filter: StreamFilter,
    pub window: TimeWindow,
    pub include_frames: bool,
    /// Only entries one of the shapes accepted
    pub lifecycle_only: bool,
}

impl EntryQuery {
    fn accepts(&self, entry: &JournalEntry) -> bool {
        let is_frame = entry.kind.as_ref().is_some_and(|k| k.is_frame());
        if is_frame && !self.include_frames {
            return false;
        }
        if self.lifecycle_only && entry.kind.is_none() {
            return false;
        }
        self.window.contains(entry.at.elapsed)
            && (self.filter.is_empty() || entry.stream.is_some_and(|k| self.filter.matches(&k)))
    }
}

/// Retained entries matching `query`, in log order.
pub fn entries<'a>(
    analysis: &'a Analysis,
    query: &'a EntryQuery,
) -> impl Iterator<Item = &'a JournalEntry> + 'a {
    analysis.journal().iter().filter(move |e| query.accepts(e))
}

/// Frames whose embedded stream matches `filter`, in log order.
pub fn frames<'a>(
    analysis: &'a Analysis,
    filter: &'a StreamFilter,
    window: &'a TimeWindow,
) -> impl Iterator<Item = &'a FrameEntry> + Clone + 'a {
    analysis.ledger().frames_for(filter, window)
}

/// One line of the frame listing when lifecycle events are interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "line", rename_all = "snake_case")]
pub enum TimelineItem<'a> {
    Lifecycle(&'a JournalEntry),
    Frame(&'a FrameEntry),
}

impl TimelineItem<'_> {
    pub fn seq(&self) -> u64 {
        match self {
            TimelineItem::Lifecycle(e) => e.seq,
            TimelineItem::Frame(f) => f.seq,
        }
    }
}

/// Frames and lifecycle entries of the filtered streams merged in log order.
/// Lifecycle entries come from the journal, so retention must be on.
pub fn timeline<'a>(
    analysis: &'a Analysis,
    filter: &'a StreamFilter,
    window: &'a TimeWindow,
) -> Vec<TimelineItem<'a>> {
    let query = EntryQuery {
        filter: filter.clone(),
        window: *window,
        include_frames: false,
        lifecycle_only: true,
    };
    let mut lifecycle = analysis
        .journal()
        .iter()
        .filter(|e| query.accepts(e))
        .peekable();
    let mut frames = frames(analysis, filter, window).peekable();

    let mut merged = Vec::new();
    loop {
        let take_lifecycle = match (lifecycle.peek(), frames.peek()) {
            (Some(e), Some(f)) => e.seq < f.seq,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let item = if take_lifecycle {
            lifecycle.next().map(TimelineItem::Lifecycle)
        } else {
            frames.next().map(TimelineItem::Frame)
        };
        merged.extend(item);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::engine::IngestOptions;

    fn line(micros: u32, message: &str) -> String {
        format!("[2020-10-14 10:00:00.{micros:06}] [http2:debug] [pid 9:tid 1] {message}\n")
    }

    fn analyse(lines: &[String]) -> Analysis {
        let mut analysis = Analysis::new(Classifier::new(), IngestOptions::default());
        for (i, l) in lines.iter().enumerate() {
            analysis.ingest_line(i as u64 + 1, l.trim_end());
        }
        analysis
    }

    fn sample() -> Analysis {
        analyse(&[
            line(0, "h2_stream(1-1,IDLE): created"),
            line(0, "h2_session(1,BUSY,1): recv FRAME[HEADERS[length=9, stream=1]], frames=1/0 (r/s)"),
            line(100, "h2_task(1-1): process connection"),
            line(150, "h2_stream(1-1,OPEN): send_headers"),
            line(200, "h2_session(1,BUSY,1): sent FRAME[DATA[length=5, stream=1, eos=1]], frames=1/1 (r/s)"),
            line(300, "h2_mplx(1): request done, 0.2 ms elapsed"),
            line(400, "h2_stream(1-3,IDLE): created"),
            line(500, "h2_session(1,BUSY,1): recv FRAME[HEADERS[length=9, stream=3]], frames=2/1 (r/s)"),
        ])
    }

    #[test]
    fn test_summary_rows_are_relative_to_creation() {
        let analysis = sample();
        let report = summary(&analysis, &StreamFilter::default(), &TimeWindow::default());
        assert_eq!(report.total, 2);
        assert_eq!(report.schema, LogSchema::WithoutScheduling);

        let row = &report.rows[0];
        assert_eq!(row.id, StreamKey::new(9, 1, 1));
        assert!(row.created.is_some());
        assert_eq!(row.started.unwrap().delta, Duration::microseconds(100));
        assert_eq!(row.ended.unwrap().delta, Duration::microseconds(300));
        assert!(row.cell(Column::Reset).is_none());
        assert_eq!(report.rows[1].id, StreamKey::new(9, 1, 3));
    }

    #[test]
    fn test_summary_window_uses_origin() {
        let analysis = sample();
        let window = TimeWindow::new(Some(std::time::Duration::from_micros(1)), None);
        let report = summary(&analysis, &StreamFilter::default(), &window);
        let ids: Vec<String> = report.rows.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, vec!["9-1-3"]);
    }

    #[test]
    fn test_columns_follow_schema() {
        assert_eq!(Column::for_schema(LogSchema::WithScheduling).len(), 6);
        let without = Column::for_schema(LogSchema::WithoutScheduling);
        assert_eq!(without.first(), Some(&Column::Started));
        assert_eq!(without.len(), 5);
    }

    #[test]
    fn test_entries_toggles() {
        let analysis = sample();
        let mut query = EntryQuery {
            filter: StreamFilter::parse("1-1").unwrap(),
            ..Default::default()
        };
        let lines: Vec<u64> = entries(&analysis, &query).map(|e| e.entry.line_no).collect();
        assert_eq!(lines, vec![1, 3, 4, 6]);

        query.lifecycle_only = true;
        let lines: Vec<u64> = entries(&analysis, &query).map(|e| e.entry.line_no).collect();
        assert_eq!(lines, vec![1, 3, 6]);

        query.include_frames = true;
        let lines: Vec<u64> = entries(&analysis, &query).map(|e| e.entry.line_no).collect();
        assert_eq!(lines, vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_empty_match_is_empty_report() {
        let analysis = sample();
        let filter = StreamFilter::parse("77").unwrap();
        let window = TimeWindow::default();
        assert_eq!(summary(&analysis, &filter, &window).total, 0);
        assert_eq!(frames(&analysis, &filter, &window).count(), 0);
        assert!(timeline(&analysis, &filter, &window).is_empty());
    }

    #[test]
    fn test_timeline_interleaves_by_log_order() {
        let analysis = sample();
        let filter = StreamFilter::parse("1").unwrap();
        let window = TimeWindow::default();
        let items = timeline(&analysis, &filter, &window);

        let seqs: Vec<u64> = items.iter().map(TimelineItem::seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 5, 6]);
        assert!(matches!(items[1], TimelineItem::Frame(_)));
        assert!(matches!(items[4], TimelineItem::Lifecycle(_)));
    }
}
