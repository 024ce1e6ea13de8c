use crate::engine::Diagnostics;
use crate::query::{Cell, Column, StreamSummary, TimelineItem};
use crate::source::timestamp::format_delta;

fn cell_text(cell: Option<&Cell>, placeholder: &str) -> String {
    match cell {
        Some(c) => format!("{} {}w", format_delta(c.delta), c.workers),
        None => placeholder.to_string(),
    }
}

/// `Streams (total=N)` followed by one aligned row per stream.
pub fn summary_table(summary: &StreamSummary, placeholder: &str) -> String {
    let columns = Column::for_schema(summary.schema);

    let mut header = vec!["id".to_string(), "created".to_string()];
    header.extend(columns.iter().map(|c| c.label().to_string()));

    let rows: Vec<Vec<String>> = summary
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.id.to_string(),
                row.created
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| placeholder.to_string()),
            ];
            cells.extend(columns.iter().map(|c| cell_text(row.cell(*c), placeholder)));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(String::len).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = format!("Streams (total={})\n", summary.total);
    for line in std::iter::once(&header).chain(rows.iter()) {
        let padded: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(padded.join("  ").trim_end());
        out.push('\n');
    }
    out
}

pub fn timeline_line(item: &TimelineItem<'_>) -> String {
    match item {
        TimelineItem::Lifecycle(e) => e.entry.to_string(),
        TimelineItem::Frame(f) => format!("  {}", f.entry),
    }
}

pub fn diagnostics(d: &Diagnostics) -> String {
    format!(
        "lines={} entries={} events={} frames={} skipped={} orphans={} duplicates={} anomalies={}",
        d.lines_read,
        d.entries,
        d.events,
        d.frames,
        d.skipped,
        d.orphans,
        d.duplicates,
        d.anomalies
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LogSchema, StreamKey};
    use crate::query::StreamRow;
    use crate::source::timestamp::{LogTime, Moment};
    use chrono::Duration;

    fn row(stream: u32, started: Option<Cell>) -> StreamRow {
        let time = LogTime::parse("2020-10-14 10:00:00.000100").unwrap();
        StreamRow {
            id: StreamKey::new(10, 1, stream),
            created: Some(time),
            origin: Moment {
                time,
                elapsed: Duration::zero(),
            },
            scheduled: None,
            started,
            ended: None,
            reset: None,
            cleanup: None,
            destroyed: None,
            request: None,
            state: None,
            reset_code: None,
            elapsed_ms: None,
            anomalous: false,
        }
    }

    #[test]
    fn test_summary_table_layout() {
        let summary = StreamSummary {
            total: 2,
            schema: LogSchema::WithoutScheduling,
            rows: vec![
                row(
                    1,
                    Some(Cell {
                        delta: Duration::microseconds(1_500_250),
                        workers: 2,
                    }),
                ),
                row(3, None),
            ],
        };
        let table = summary_table(&summary, "--");
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "Streams (total=2)");
        assert!(lines[1].starts_with("id      created"));
        assert!(!lines[1].contains("scheduled"));
        assert!(lines[2].contains("+1.500250 2w"));
        assert!(lines[2].starts_with("10-1-1  2020-10-14 10:00:00.000100"));
        assert!(lines[3].ends_with("--"));
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_scheduled_column_follows_schema() {
        let summary = StreamSummary {
            total: 0,
            schema: LogSchema::WithScheduling,
            rows: Vec::new(),
        };
        let table = summary_table(&summary, "--");
        assert_eq!(
            table,
            "Streams (total=0)\nid  created  scheduled  started  ended  reset  cleanup  destroyed\n"
        );
    }

    #[test]
    fn test_diagnostics_line() {
        let d = Diagnostics {
            lines_read: 3,
            orphans: 1,
            ..Default::default()
        };
        assert_eq!(
            diagnostics(&d),
            "lines=3 entries=0 events=0 frames=0 skipped=0 orphans=1 duplicates=0 anomalies=0"
        );
    }
}
