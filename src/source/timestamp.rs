use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimestampError {
    #[error("unrecognized timestamp: '{0}'")]
    Unrecognized(String),

    #[error("relative timestamp '{value}' is malformed: {reason}")]
    Relative { value: String, reason: String },
}

/// Absolute formats httpd writes, tried in order after RFC 3339.
const ABSOLUTE_FORMATS: &[&str] = &[
    "%a %b %d %H:%M:%S%.f %Y",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// The time written at the start of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTime {
    /// Wall-clock time with date. Server local time is taken as UTC.
    Absolute(DateTime<Utc>),
    /// Offset from the start of the log file.
    Relative(Duration),
}

impl LogTime {
    /// Parse the bracketed timestamp of an httpd error log line.
    pub fn parse(value: &str) -> Result<Self, TimestampError> {
        let value = value.trim();
        if let Some(rest) = value.strip_prefix('+') {
            return parse_relative(rest).map(LogTime::Relative);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(LogTime::Absolute(dt.with_timezone(&Utc)));
        }

        ABSOLUTE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(|ndt| LogTime::Absolute(Utc.from_utc_datetime(&ndt)))
            .ok_or_else(|| TimestampError::Unrecognized(value.to_string()))
    }
}

impl fmt::Display for LogTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTime::Absolute(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
            LogTime::Relative(d) => write!(f, "{}", format_delta(*d)),
        }
    }
}

/// Parse `S.ffffff` or `H:MM:SS.ffffff` (the leading `+` already removed).
fn parse_relative(value: &str) -> Result<Duration, TimestampError> {
    let malformed = |reason: &str| TimestampError::Relative {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 {
        return Err(malformed("too many ':' separated fields"));
    }
    let seconds_part = parts.pop().ok_or_else(|| malformed("empty"))?;

    let out_of_range = || malformed("out of range");
    let mut total_secs: i64 = 0;
    for p in parts {
        let n: i64 = p.parse().map_err(|_| malformed("non-numeric field"))?;
        total_secs = total_secs
            .checked_mul(60)
            .and_then(|s| s.checked_add(n))
            .ok_or_else(out_of_range)?;
    }

    let (secs, frac) = match seconds_part.split_once('.') {
        Some((s, f)) => (s, f),
        None => (seconds_part, ""),
    };
    let secs: i64 = secs.parse().map_err(|_| malformed("non-numeric seconds"))?;
    total_secs = total_secs
        .checked_mul(60)
        .and_then(|s| s.checked_add(secs))
        .ok_or_else(out_of_range)?;

    let micros = if frac.is_empty() {
        0
    } else {
        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("bad fraction"));
        }
        // Right-pad to nanoseconds, then truncate to micros.
        let nanos: i64 = format!("{:0<9}", frac)
            .parse()
            .map_err(|_| malformed("bad fraction"))?;
        nanos / 1_000
    };

    Duration::try_seconds(total_secs)
        .and_then(|d| d.checked_add(&Duration::microseconds(micros)))
        .ok_or_else(out_of_range)
}

/// Render a signed delta as `+S.ffffff` / `-S.ffffff`.
pub fn format_delta(d: Duration) -> String {
    let sign = if d < Duration::zero() { '-' } else { '+' };
    let abs = d.abs();
    let secs = abs.num_seconds();
    let micros = (abs - Duration::seconds(secs)).num_microseconds().unwrap_or(0);
    format!("{sign}{secs}.{micros:06}")
}

impl Serialize for LogTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

pub(crate) fn serialize_delta<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_delta(*d))
}

/// A point in the log: the stamp as written plus the offset from the log start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Moment {
    pub time: LogTime,
    #[serde(serialize_with = "serialize_delta")]
    pub elapsed: Duration,
}

/// Turns stamps into [`Moment`]s, anchoring absolute stamps at the first one seen.
#[derive(Debug, Default, Clone)]
pub struct Clock {
    origin: Option<DateTime<Utc>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn moment(&mut self, time: LogTime) -> Moment {
        let elapsed = match time {
            LogTime::Absolute(dt) => {
                let origin = *self.origin.get_or_insert(dt);
                dt - origin
            }
            LogTime::Relative(d) => d,
        };
        Moment { time, elapsed }
    }
}
