pub mod entry;
pub mod reader;
pub mod timestamp;

pub use entry::{EntryParser, LogEntry, LogLevel};
pub use reader::{LineReader, RawLine, ReaderError};
pub use timestamp::{format_delta, Clock, LogTime, Moment, TimestampError};
