use crate::classify::Classifier;
use crate::cli::render;
use crate::config::{Config, ConfigError, ReportFormat};
use crate::engine::{Analysis, IngestOptions};
use crate::query::{self, EntryQuery, FilterError, StreamFilter, TimeWindow};
use crate::source::reader::ReaderError;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Reader(#[from] ReaderError),

    #[error("invalid stream filter: {0}")]
    Filter(#[from] FilterError),

    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Log file and the streams and time slice a report is about.
#[derive(Debug, Clone, Args)]
pub struct Selection {
    /// httpd error log with HTTP/2 trace output
    pub log: PathBuf,

    /// Comma-separated stream ids: pid-session-stream, session-stream or stream
    #[arg(short = 's', long = "streams", value_name = "IDS")]
    pub ids: Option<String>,

    /// Skip everything before this offset from the start of the log (e.g. 1s 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub from: Option<Duration>,

    /// Skip everything after this offset from the start of the log
    #[arg(long, value_parser = humantime::parse_duration)]
    pub to: Option<Duration>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Selection {
    fn filter(&self) -> Result<StreamFilter, FilterError> {
        match &self.ids {
            Some(ids) => StreamFilter::parse(ids),
            None => Ok(StreamFilter::default()),
        }
    }

    /// Flags take precedence over the configured window, bound by bound.
    fn window(&self, config: &Config) -> TimeWindow {
        let configured = config.report.window;
        TimeWindow::new(
            self.from.or(configured.from),
            self.to.or(configured.to),
        )
    }

    fn format(&self, config: &Config) -> ReportFormat {
        if self.json {
            ReportFormat::Json
        } else {
            config.report.format
        }
    }

    fn analyse(&self, config: &Config, retain_entries: bool) -> Result<Analysis, AnalyzeError> {
        let classifier = Classifier::for_module(config.input.module.as_str());
        let analysis =
            Analysis::from_path(&self.log, classifier, IngestOptions { retain_entries })?;
        if config.report.diagnostics {
            eprintln!("{}", render::diagnostics(analysis.diagnostics()));
        }
        Ok(analysis)
    }
}

/// Stream lifecycle table.
pub fn summary(config: &Config, selection: &Selection, out: &mut dyn Write) -> Result<(), AnalyzeError> {
    let filter = selection.filter()?;
    let window = selection.window(config);
    let analysis = selection.analyse(config, false)?;

    let report = query::summary(&analysis, &filter, &window);
    match selection.format(config) {
        ReportFormat::Table => {
            out.write_all(render::summary_table(&report, &config.report.placeholder).as_bytes())?
        }
        ReportFormat::Json => write_json(out, &report)?,
    }
    Ok(())
}

/// Raw log entries of the selected streams.
pub fn entries(
    config: &Config,
    selection: &Selection,
    include_frames: bool,
    lifecycle_only: bool,
    out: &mut dyn Write,
) -> Result<(), AnalyzeError> {
    let wanted = EntryQuery {
        filter: selection.filter()?,
        window: selection.window(config),
        include_frames,
        lifecycle_only,
    };
    let analysis = selection.analyse(config, true)?;

    let selected = query::entries(&analysis, &wanted);
    match selection.format(config) {
        ReportFormat::Table => {
            for entry in selected {
                writeln!(out, "{}", entry.entry)?;
            }
        }
        ReportFormat::Json => write_json(out, &selected.collect::<Vec<_>>())?,
    }
    Ok(())
}

/// Frames of the selected streams, optionally interleaved with their lifecycle entries.
pub fn frames(
    config: &Config,
    selection: &Selection,
    with_lifecycle: bool,
    out: &mut dyn Write,
) -> Result<(), AnalyzeError> {
    let filter = selection.filter()?;
    let window = selection.window(config);
    let analysis = selection.analyse(config, with_lifecycle)?;
    let format = selection.format(config);

    if with_lifecycle {
        let items = query::timeline(&analysis, &filter, &window);
        match format {
            ReportFormat::Table => {
                for item in &items {
                    writeln!(out, "{}", render::timeline_line(item))?;
                }
            }
            ReportFormat::Json => write_json(out, &items)?,
        }
    } else {
        let frames = query::frames(&analysis, &filter, &window);
        match format {
            ReportFormat::Table => {
                for frame in frames {
                    writeln!(out, "{}", frame.entry)?;
                }
            }
            ReportFormat::Json => write_json(out, &frames.collect::<Vec<_>>())?,
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<(), AnalyzeError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
