use crate::classify::{Direction, FrameEvent};
use crate::engine::registry::{SessionKey, StreamKey};
use crate::query::filter::{StreamFilter, TimeWindow};
use crate::source::entry::LogEntry;
use crate::source::timestamp::Moment;
use serde::Serialize;

/// One frame line, with the session's state and counters as reported on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameEntry {
    /// Journal sequence number; orders frames against other entries
    pub seq: u64,
    pub at: Moment,
    pub session: SessionKey,
    pub direction: Direction,
    pub event: FrameEvent,
    pub entry: LogEntry,
}

impl FrameEntry {
    /// Stream the frame belongs to, if the descriptor names one.
    pub fn stream_key(&self) -> Option<StreamKey> {
        self.event.frame.stream_id.map(|id| self.session.stream(id))
    }
}

/// Arrival-ordered record of every frame in the log.
#[derive(Debug, Default)]
pub struct FrameLedger {
    frames: Vec<FrameEntry>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame; returns its index for the session's frame list.
    pub fn record(&mut self, frame: FrameEntry) -> usize {
        self.frames.push(frame);
        self.frames.len() - 1
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrameEntry> {
        self.frames.iter()
    }

    /// Frames whose embedded stream matches `filter` and whose time falls in
    /// `window`, in log order. The iterator is lazy and can be cloned to restart.
    pub fn frames_for<'a>(
        &'a self,
        filter: &'a StreamFilter,
        window: &'a TimeWindow,
    ) -> impl Iterator<Item = &'a FrameEntry> + Clone + 'a {
        self.iter().filter(move |f| {
            window.contains(f.at.elapsed)
                && (filter.is_empty() || f.stream_key().is_some_and(|k| filter.matches(&k)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FrameDescriptor;
    use crate::source::entry::LogLevel;
    use crate::source::timestamp::LogTime;
    use chrono::Duration;

    fn frame(seq: u64, session: u64, stream: u32, micros: i64) -> FrameEntry {
        let time = LogTime::Relative(Duration::microseconds(micros));
        FrameEntry {
            seq,
            at: Moment {
                time,
                elapsed: Duration::microseconds(micros),
            },
            session: SessionKey::new(1, session),
            direction: Direction::Received,
            event: FrameEvent {
                session,
                session_state: Some("BUSY".to_string()),
                open_streams: Some(1),
                frame: FrameDescriptor::parse(&format!("DATA[length=1, stream={stream}]")).unwrap(),
                counters: None,
            },
            entry: LogEntry {
                line_no: seq + 1,
                time,
                module: "http2".to_string(),
                level: LogLevel::Debug,
                pid: 1,
                tid: None,
                source: None,
                client: None,
                message: String::new(),
            },
        }
    }

    #[test]
    fn test_frames_for_stream_in_order() {
        let mut ledger = FrameLedger::new();
        ledger.record(frame(0, 1, 3, 0));
        ledger.record(frame(1, 1, 5, 10));
        ledger.record(frame(2, 2, 3, 20));
        ledger.record(frame(3, 1, 3, 30));

        let filter = StreamFilter::parse("1-3").unwrap();
        let window = TimeWindow::default();
        let seqs: Vec<u64> = ledger.frames_for(&filter, &window).map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 3]);
    }

    #[test]
    fn test_frames_for_is_restartable() {
        let mut ledger = FrameLedger::new();
        ledger.record(frame(0, 1, 3, 0));
        ledger.record(frame(1, 1, 3, 10));

        let filter = StreamFilter::default();
        let window = TimeWindow::default();
        let frames = ledger.frames_for(&filter, &window);
        assert_eq!(frames.clone().count(), 2);
        assert_eq!(frames.count(), 2);
    }

    #[test]
    fn test_frames_for_time_window() {
        let mut ledger = FrameLedger::new();
        for (i, micros) in [0, 1_000_000, 2_000_000, 3_000_000].into_iter().enumerate() {
            ledger.record(frame(i as u64, 1, 1, micros));
        }
        let filter = StreamFilter::default();
        let window = TimeWindow::new(
            Some(std::time::Duration::from_secs(1)),
            Some(std::time::Duration::from_secs(2)),
        );
        let seqs: Vec<u64> = ledger.frames_for(&filter, &window).map(|f| f.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_connection_frames_only_match_stream_zero() {
        let mut ledger = FrameLedger::new();
        ledger.record(frame(0, 1, 0, 0));
        ledger.record(frame(1, 1, 1, 0));

        let filter = StreamFilter::parse("0").unwrap();
        let window = TimeWindow::default();
        let seqs: Vec<u64> = ledger.frames_for(&filter, &window).map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0]);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.frames.get(1).is_some());
    }
}
