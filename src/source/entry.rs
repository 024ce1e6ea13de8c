use crate::source::timestamp::LogTime;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// httpd log levels, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Emerg,
    Alert,
    Crit,
    Error,
    Warn,
    Notice,
    Info,
    Debug,
    Trace1,
    Trace2,
    Trace3,
    Trace4,
    Trace5,
    Trace6,
    Trace7,
    Trace8,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Emerg => "emerg",
            LogLevel::Alert => "alert",
            LogLevel::Crit => "crit",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace1 => "trace1",
            LogLevel::Trace2 => "trace2",
            LogLevel::Trace3 => "trace3",
            LogLevel::Trace4 => "trace4",
            LogLevel::Trace5 => "trace5",
            LogLevel::Trace6 => "trace6",
            LogLevel::Trace7 => "trace7",
            LogLevel::Trace8 => "trace8",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s {
            "emerg" => LogLevel::Emerg,
            "alert" => LogLevel::Alert,
            "crit" => LogLevel::Crit,
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "notice" => LogLevel::Notice,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            "trace1" => LogLevel::Trace1,
            "trace2" => LogLevel::Trace2,
            "trace3" => LogLevel::Trace3,
            "trace4" => LogLevel::Trace4,
            "trace5" => LogLevel::Trace5,
            "trace6" => LogLevel::Trace6,
            "trace7" => LogLevel::Trace7,
            "trace8" => LogLevel::Trace8,
            other => return Err(format!("unknown log level '{}'", other)),
        };
        Ok(level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error log line, split into header fields and the free-text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// 1-based line number in the input file
    pub line_no: u64,
    pub time: LogTime,
    pub module: String,
    pub level: LogLevel,
    pub pid: u32,
    pub tid: Option<u64>,
    /// Source file and line, e.g. `h2_stream.c(251)`
    pub source: Option<String>,
    pub client: Option<String>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [pid:{}", self.time, self.pid)?;
        if let Some(tid) = self.tid {
            write!(f, " tid:{}", tid)?;
        }
        write!(f, "] [{}] ", self.level)?;
        if let Some(source) = &self.source {
            write!(f, "[{}] ", source)?;
        }
        f.write_str(&self.message)
    }
}

/// Splits error log lines into [`LogEntry`] headers.
#[derive(Debug)]
pub struct EntryParser {
    pattern: Regex,
}

impl Default for EntryParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryParser {
    pub fn new() -> Self {
        let pattern = Regex::new(concat!(
            r"^\[(?P<ts>[^\]]+)\] ",
            r"\[(?P<module>[^:\]\s]+):(?P<level>[^\]\s]+)\] ",
            r"\[pid (?P<pid>\d+)(?::tid (?P<tid>\d+))?\] ",
            r"(?:(?P<source>\S+\.\w+\(\d+\)): )?",
            r"(?:\[client (?P<client>[^\]]+)\] )?",
            r"(?P<message>.*)$",
        ))
        .expect("built-in entry pattern must compile");

        Self { pattern }
    }

    /// Parse one line. Returns None when the line is not an httpd error log line
    /// or one of its header fields is malformed.
    pub fn parse(&self, line_no: u64, line: &str) -> Option<LogEntry> {
        let caps = self.pattern.captures(line)?;

        let time = LogTime::parse(&caps["ts"]).ok()?;
        let level = caps["level"].parse::<LogLevel>().ok()?;
        let pid = caps["pid"].parse::<u32>().ok()?;
        let tid = match caps.name("tid") {
            Some(m) => Some(m.as_str().parse::<u64>().ok()?),
            None => None,
        };

        Some(LogEntry {
            line_no,
            time,
            module: caps["module"].to_string(),
            level,
            pid,
            tid,
            source: caps.name("source").map(|m| m.as_str().to_string()),
            client: caps.name("client").map(|m| m.as_str().to_string()),
            message: caps["message"].to_string(),
        })
    }
}
