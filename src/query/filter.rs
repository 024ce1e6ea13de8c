use crate::engine::registry::StreamKey;
use chrono::Duration;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid stream identifier '{0}': expected pid-session-stream, session-stream or stream")]
    InvalidPattern(String),
}

/// One identifier a caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum IdPattern {
    /// `pid-session-stream`
    Full { pid: u32, session: u64, stream: u32 },
    /// `session-stream`, any process
    SessionStream { session: u64, stream: u32 },
    /// `stream`, any process and session
    Stream { stream: u32 },
}

impl IdPattern {
    pub fn matches(&self, key: &StreamKey) -> bool {
        match *self {
            IdPattern::Full {
                pid,
                session,
                stream,
            } => key.pid == pid && key.session == session && key.stream == stream,
            IdPattern::SessionStream { session, stream } => {
                key.session == session && key.stream == stream
            }
            IdPattern::Stream { stream } => key.stream == stream,
        }
    }
}

impl FromStr for IdPattern {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FilterError::InvalidPattern(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        match parts.as_slice() {
            [pid, session, stream] => Ok(IdPattern::Full {
                pid: pid.parse().map_err(|_| invalid())?,
                session: session.parse().map_err(|_| invalid())?,
                stream: stream.parse().map_err(|_| invalid())?,
            }),
            [session, stream] => Ok(IdPattern::SessionStream {
                session: session.parse().map_err(|_| invalid())?,
                stream: stream.parse().map_err(|_| invalid())?,
            }),
            [stream] => Ok(IdPattern::Stream {
                stream: stream.parse().map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPattern::Full {
                pid,
                session,
                stream,
            } => write!(f, "{pid}-{session}-{stream}"),
            IdPattern::SessionStream { session, stream } => write!(f, "{session}-{stream}"),
            IdPattern::Stream { stream } => write!(f, "{stream}"),
        }
    }
}

/// A set of identifier patterns. The empty filter matches every stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamFilter {
    patterns: Vec<IdPattern>,
}

impl StreamFilter {
    /// Parse a comma-separated list such as `4711-1-3,2-5,7`.
    pub fn parse(list: &str) -> Result<Self, FilterError> {
        let patterns = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn from_patterns(patterns: Vec<IdPattern>) -> Self {
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[IdPattern] {
        &self.patterns
    }

    pub fn matches(&self, key: &StreamKey) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(key))
    }
}

/// Inclusive bounds on the elapsed time since the start of the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    from: Option<Duration>,
    to: Option<Duration>,
}

impl TimeWindow {
    pub fn new(from: Option<std::time::Duration>, to: Option<std::time::Duration>) -> Self {
        // Out-of-range bounds are treated as unbounded
        Self {
            from: from.and_then(|d| Duration::from_std(d).ok()),
            to: to.and_then(|d| Duration::from_std(d).ok()),
        }
    }

    pub fn contains(&self, elapsed: Duration) -> bool {
        self.from.map_or(true, |from| elapsed >= from) && self.to.map_or(true, |to| elapsed <= to)
    }
}
