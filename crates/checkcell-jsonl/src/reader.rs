//! JSONL reading operations.
//!
//! [`JsonlReader`] reads one record per line with line-number tracking so
//! failures can be reported precisely. Blank lines are ignored in both the
//! strict and the resilient modes.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::warning::{LineProblem, Warning};

/// Reader for JSONL (JSON Lines) data.
///
/// # Examples
///
/// ```
/// use checkcell_jsonl::JsonlReader;
/// use std::io::Cursor;
///
/// let data = Cursor::new("{\"id\":1}\n\n{\"id\":2}\n");
/// let mut reader = JsonlReader::new(data);
///
/// let first: serde_json::Value = reader.read_record()?.unwrap();
/// assert_eq!(first["id"], 1);
/// let second: serde_json::Value = reader.read_record()?.unwrap();
/// assert_eq!(second["id"], 2);
/// assert_eq!(reader.line_number(), 3);
/// # Ok::<(), checkcell_jsonl::Error>(())
/// ```
pub struct JsonlReader<R> {
    /// Buffered reader wrapping the underlying reader.
    reader: BufReader<R>,
    /// Current line number (1-based, 0 before any line is read).
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: Read> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Creates a new `JsonlReader` with a custom buffer capacity.
    #[must_use]
    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(capacity, reader),
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Returns the 1-based number of the last line read, or 0 before any read.
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next raw line into the internal buffer.
    ///
    /// Returns `false` at end of input. The trailing newline (and a preceding
    /// carriage return) are stripped.
    fn next_raw_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf)?;
        if read == 0 {
            return Ok(false);
        }
        self.line_number += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        Ok(true)
    }

    /// Reads and decodes the next non-blank record.
    ///
    /// Returns `Ok(None)` at end of input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Line`] if the line is not valid JSON for `T`,
    /// [`Error::InvalidFormat`] if it is not valid UTF-8, and [`Error::Io`] on
    /// read failures.
    pub fn read_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        while self.next_raw_line()? {
            let Ok(text) = std::str::from_utf8(&self.buf) else {
                return Err(Error::InvalidFormat(format!(
                    "line {} is not valid UTF-8",
                    self.line_number
                )));
            };
            if text.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|source| Error::Line {
                    line_number: self.line_number,
                    source,
                });
        }
        Ok(None)
    }

    /// Reads every remaining record, skipping damaged lines.
    ///
    /// Lines that are not valid UTF-8 or not valid JSON for `T` are recorded
    /// in `warnings` and skipped. Only I/O failures abort the read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the underlying reader fails.
    pub fn read_resilient<T: DeserializeOwned>(
        &mut self,
        warnings: &mut Vec<Warning>,
    ) -> Result<Vec<T>> {
        let mut records = Vec::new();
        while self.next_raw_line()? {
            let Ok(text) = std::str::from_utf8(&self.buf) else {
                warnings.push(Warning::new(self.line_number, LineProblem::InvalidUtf8));
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(text) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::debug!(line = self.line_number, error = %e, "Skipping malformed JSONL line");
                    warnings.push(Warning::new(self.line_number, LineProblem::Malformed(e.to_string())));
                }
            }
        }
        Ok(records)
    }

    /// Consumes the reader, returning the underlying buffered reader.
    #[must_use]
    pub fn into_inner(self) -> BufReader<R> {
        self.reader
    }
}

/// Reads a JSONL file, skipping damaged lines.
///
/// Returns the decoded records and the warnings for every skipped line.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or read.
pub fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = JsonlReader::new(file);
    let mut warnings = Vec::new();
    let records = reader.read_resilient(&mut warnings)?;

    tracing::debug!(
        path = %path.display(),
        records = records.len(),
        warnings = warnings.len(),
        "Loaded JSONL file"
    );
    Ok((records, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn new_reader_starts_at_line_zero() {
        let reader = JsonlReader::new(Cursor::new(b""));
        assert_eq!(reader.line_number(), 0);
    }

    #[test]
    fn read_record_returns_none_at_end() {
        let mut reader = JsonlReader::new(Cursor::new(b"\n\n"));
        let record: Option<serde_json::Value> = reader.read_record().unwrap();
        assert!(record.is_none());
        assert_eq!(reader.line_number(), 2);
    }

    #[test]
    fn read_record_reports_line_number_of_bad_json() {
        let mut reader = JsonlReader::new(Cursor::new("{\"a\":1}\n{oops\n"));
        let _: serde_json::Value = reader.read_record().unwrap().unwrap();

        let err = reader.read_record::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, Error::Line { line_number: 2, .. }));
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let mut reader = JsonlReader::new(Cursor::new("{\"a\":1}\r\n{\"a\":2}\r\n"));
        let values: Vec<serde_json::Value> = reader
            .read_resilient(&mut Vec::new())
            .unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn with_capacity_creates_reader() {
        let reader = JsonlReader::with_capacity(Cursor::new(b"{}"), 8192);
        assert_eq!(reader.line_number(), 0);
        let _inner = reader.into_inner();
    }
}
