//! JSONL writing operations.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Writer for JSONL (JSON Lines) data.
///
/// Each value is serialized to a single line followed by `\n`.
///
/// # Examples
///
/// ```
/// use checkcell_jsonl::JsonlWriter;
///
/// let mut writer = JsonlWriter::new(Vec::new());
/// writer.write(&serde_json::json!({"id": 1}))?;
/// writer.write(&serde_json::json!({"id": 2}))?;
/// let bytes = writer.finish()?;
/// assert_eq!(String::from_utf8(bytes).unwrap(), "{\"id\":1}\n{\"id\":2}\n");
/// # Ok::<(), checkcell_jsonl::Error>(())
/// ```
pub struct JsonlWriter<W: Write> {
    /// Buffered writer wrapping the underlying writer.
    writer: BufWriter<W>,
    records: usize,
}

impl<W: Write> JsonlWriter<W> {
    /// Creates a new `JsonlWriter` wrapping the given writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            records: 0,
        }
    }

    /// Serializes one value as a line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying write fails.
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far.
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying flush fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::Error::Io(e.into_error()))
    }
}

/// Writes `values` to `path` as JSONL, replacing any existing file.
///
/// # Errors
///
/// Returns an error if the file cannot be created or a value fails to
/// serialize.
pub fn write_jsonl<T, P>(path: P, values: &[T]) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let mut writer = JsonlWriter::new(File::create(path.as_ref())?);
    for value in values {
        writer.write(value)?;
    }
    writer.flush()?;
    tracing::debug!(
        path = %path.as_ref().display(),
        records = writer.records_written(),
        "Wrote JSONL file"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_writer_produces_no_output() {
        let writer = JsonlWriter::new(Vec::new());
        assert_eq!(writer.records_written(), 0);
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn each_record_ends_with_newline() {
        let mut writer = JsonlWriter::new(Vec::new());
        writer.write(&"a").unwrap();
        writer.write(&[1, 2]).unwrap();
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(out, "\"a\"\n[1,2]\n");
    }
}
