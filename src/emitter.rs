//! NDJSON export of accepted records.
//!
//! Writes one JSON object per accepted record, tagged with its category and
//! the line it came from:
//! ```json
//! {"category": "INIT", "line_no": 3, "stable_txn_id": 7, "stable_ts": 100}
//! ```

use crate::error::Error;
use crate::record::Record;
use crate::verify::RecordSink;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Records accepted records as NDJSON.
pub struct RecordEmitter<W: Write> {
    writer: BufWriter<W>,
    count: usize,
}

impl RecordEmitter<File> {
    /// Create an emitter writing to a new file at `path`.
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> RecordEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            count: 0,
        }
    }

    /// Write `record` as one NDJSON line.
    pub fn emit(&mut self, line_no: usize, record: &Record) -> Result<(), Error> {
        let mut obj = serde_json::to_value(record)?;
        if let Some(map) = obj.as_object_mut() {
            map.insert("line_no".to_string(), serde_json::Value::from(line_no));
        }

        serde_json::to_writer(&mut self.writer, &obj)?;
        self.writer.write_all(b"\n")?;

        self.count += 1;
        Ok(())
    }

    /// Flush buffered output and return the number of records emitted.
    pub fn finish(mut self) -> Result<usize, Error> {
        self.writer.flush()?;
        Ok(self.count)
    }

    /// Flush buffered output and hand back the underlying writer.
    pub fn into_inner(self) -> Result<W, Error> {
        self.writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }

    /// Number of records emitted so far.
    pub fn count(&self) -> usize {
        self.count
    }
}

impl<W: Write> RecordSink for RecordEmitter<W> {
    fn accept(&mut self, line_no: usize, record: &Record) -> Result<(), Error> {
        self.emit(line_no, record)
    }
}
