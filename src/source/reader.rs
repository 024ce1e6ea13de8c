use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to open log file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line_no} (byte offset {offset}) is not valid UTF-8")]
    Encoding { line_no: u64, offset: u64 },
}

/// A raw line read from the log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 1-based line number
    pub line_no: u64,
    /// Byte offset of the first byte of the line
    pub offset: u64,
    pub text: String,
}

/// Reads a log file one line at a time. The file handle is held for the
/// lifetime of the reader and released when it is dropped.
pub struct LineReader<R> {
    inner: R,
    line_no: u64,
    offset: u64,
    failed: bool,
}

impl LineReader<BufReader<File>> {
    /// Open a log file for a single forward pass
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let file = File::open(path).map_err(|e| ReaderError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line_no: 0,
            offset: 0,
            failed: false,
        }
    }

    /// Read the next line. Returns Ok(None) at EOF.
    pub fn next_line(&mut self) -> Result<Option<RawLine>, ReaderError> {
        let mut buf = Vec::new();
        let bytes_read = self.inner.read_until(b'\n', &mut buf)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        self.line_no += 1;
        let line_start = self.offset;
        self.offset += bytes_read as u64;

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        let text = String::from_utf8(buf).map_err(|_| ReaderError::Encoding {
            line_no: self.line_no,
            offset: line_start,
        })?;

        Ok(Some(RawLine {
            line_no: self.line_no,
            offset: line_start,
            text,
        }))
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = Result<RawLine, ReaderError>;

    /// Yields lines until EOF or the first error; a fatal error ends the iteration.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_lines_with_offsets() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "first").unwrap();
        writeln!(temp_file, "second").unwrap();
        temp_file.flush().unwrap();

        let mut reader = LineReader::open(temp_file.path()).unwrap();

        let first = reader.next_line().unwrap().unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(first.line_no, 1);
        assert_eq!(first.offset, 0);

        let second = reader.next_line().unwrap().unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(second.line_no, 2);
        // "first\n" = 6 bytes
        assert_eq!(second.offset, 6);

        assert!(reader.next_line().unwrap().is_none());
        assert_eq!(reader.offset(), 13);
    }

    #[test]
    fn test_crlf_and_missing_final_newline() {
        let reader = LineReader::new(Cursor::new(b"a\r\nb".to_vec()));
        let lines: Vec<String> = reader.map(|l| l.unwrap().text).collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut reader = LineReader::open(temp_file.path()).unwrap();
        assert!(reader.next_line().unwrap().is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = LineReader::open(Path::new("/nonexistent/h2trace/error_log"));
        assert!(matches!(result, Err(ReaderError::Open { .. })));
    }

    #[test]
    fn test_invalid_utf8_is_fatal_and_stops_iteration() {
        let data = b"ok\n\xff\xfe broken\nnever read\n".to_vec();
        let mut reader = LineReader::new(Cursor::new(data));

        assert_eq!(reader.next().unwrap().unwrap().text, "ok");
        match reader.next() {
            Some(Err(ReaderError::Encoding { line_no, offset })) => {
                assert_eq!(line_no, 2);
                assert_eq!(offset, 3);
            }
            other => panic!("expected encoding error, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }
}
