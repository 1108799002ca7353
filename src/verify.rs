//! Single-pass driver: trace file → classifier → parser → checker.
//!
//! Lines are processed strictly in file order, one to completion before the
//! next. The checker's temporal reasoning relies on the engine having
//! written its trace lines in the order the events happened; a log whose
//! emission order differs from causal order cannot be verified.

use crate::checker::{CheckSummary, Checker};
use crate::error::{Error, ParseError, RecordError, VerifyResult};
use crate::record::{Record, RecordCategory};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Marker carried by every RTS verbose message.
pub const DEFAULT_TRACE_MARKER: &str = "WT_VERB_RTS";

/// Configuration for a verification run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct VerifierConfig {
    /// Lines not containing this literal are ignored (default: "WT_VERB_RTS").
    pub trace_marker: String,

    /// Reject records that arrive before `[INIT]` (default: true).
    pub require_init_first: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            trace_marker: DEFAULT_TRACE_MARKER.into(),
            require_init_first: true,
        }
    }
}

impl VerifierConfig {
    pub fn builder() -> VerifierConfigBuilder {
        VerifierConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct VerifierConfigBuilder {
    trace_marker: Option<String>,
    require_init_first: Option<bool>,
}

impl VerifierConfigBuilder {
    pub fn trace_marker(mut self, marker: impl Into<String>) -> Self {
        self.trace_marker = Some(marker.into());
        self
    }

    pub fn require_init_first(mut self, require: bool) -> Self {
        self.require_init_first = Some(require);
        self
    }

    pub fn build(self) -> VerifierConfig {
        let defaults = VerifierConfig::default();
        VerifierConfig {
            trace_marker: self.trace_marker.unwrap_or(defaults.trace_marker),
            require_init_first: self.require_init_first.unwrap_or(defaults.require_init_first),
        }
    }
}

impl From<&str> for VerifierConfig {
    fn from(trace_marker: &str) -> Self {
        Self {
            trace_marker: trace_marker.to_string(),
            ..Default::default()
        }
    }
}

/// Receives each record after the checker has accepted it.
///
/// A sink lives for one run only; the caller owns it and decides where its
/// output goes.
pub trait RecordSink {
    fn accept(&mut self, line_no: usize, record: &Record) -> Result<(), Error>;
}

/// Outcome of a run that found no violation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifySummary {
    pub lines_read: usize,
    /// Lines carrying the trace marker.
    pub trace_lines: usize,
    #[serde(flatten)]
    pub checks: CheckSummary,
}

/// Line-by-line verifier owning the checker for one run.
#[derive(Debug)]
pub struct Verifier {
    trace_marker: String,
    checker: Checker,
    lines_read: usize,
    trace_lines: usize,
}

impl Verifier {
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            trace_marker: config.trace_marker.clone(),
            checker: Checker::new(config.require_init_first),
            lines_read: 0,
            trace_lines: 0,
        }
    }

    /// Process the next line of the log.
    ///
    /// Returns the accepted record, or `None` for a line without the trace
    /// marker.
    pub fn feed(&mut self, line: &str) -> VerifyResult<Option<Record>> {
        self.lines_read += 1;
        let line_no = self.lines_read;

        if !line.contains(self.trace_marker.as_str()) {
            return Ok(None);
        }
        self.trace_lines += 1;

        let category = RecordCategory::classify(line);
        let record = Record::parse(line, category).map_err(|e| rejected(line_no, line, e.into()))?;
        self.checker
            .apply(&record)
            .map_err(|e| rejected(line_no, line, e.into()))?;

        debug!(line_no, %category, "Record accepted");
        Ok(Some(record))
    }

    /// Process the next line of the log given as raw bytes.
    ///
    /// Bytes that are not valid UTF-8 only matter on a trace line, which is
    /// then rejected with its line number.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> VerifyResult<Option<Record>> {
        if let Ok(line) = std::str::from_utf8(bytes) {
            return self.feed(line);
        }

        self.lines_read += 1;
        let line = String::from_utf8_lossy(bytes);
        if !line.contains(self.trace_marker.as_str()) {
            return Ok(None);
        }
        self.trace_lines += 1;
        Err(rejected(self.lines_read, &line, ParseError::InvalidUtf8.into()))
    }

    /// Feed every line of `reader`, handing accepted records to `sink`.
    pub fn run<R: BufRead>(
        mut self,
        mut reader: R,
        mut sink: Option<&mut dyn RecordSink>,
    ) -> VerifyResult<VerifySummary> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = buf
                .strip_suffix(b"\n")
                .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
                .unwrap_or(buf.as_slice());
            if let Some(record) = self.feed_bytes(line)? {
                if let Some(sink) = sink.as_deref_mut() {
                    sink.accept(self.lines_read, &record)?;
                }
            }
        }

        let summary = self.summary();
        info!(
            lines = summary.lines_read,
            trace_lines = summary.trace_lines,
            trees = summary.checks.trees,
            pages = summary.checks.pages,
            "RTS trace verified"
        );
        Ok(summary)
    }

    pub fn checker(&self) -> &Checker {
        &self.checker
    }

    pub fn summary(&self) -> VerifySummary {
        VerifySummary {
            lines_read: self.lines_read,
            trace_lines: self.trace_lines,
            checks: self.checker.summary(),
        }
    }
}

fn rejected(line_no: usize, line: &str, reason: RecordError) -> Error {
    Error::Rejected {
        line_no,
        line: line.trim_end().to_string(),
        reason,
    }
}

/// Verify a trace log file.
///
/// The file is read once, top to bottom, and closed before returning on
/// every path.
pub fn verify_file(config: &VerifierConfig, path: &Path) -> VerifyResult<VerifySummary> {
    let file = std::fs::File::open(path).map_err(|source| Error::OpenTrace {
        path: PathBuf::from(path),
        source,
    })?;

    info!(
        path = %path.display(),
        marker = %config.trace_marker,
        "Verifying RTS trace"
    );
    Verifier::new(config).run(std::io::BufReader::new(file), None)
}

/// Verify a trace log file, passing every accepted record to `sink`.
pub fn verify_file_with_sink(
    config: &VerifierConfig,
    path: &Path,
    sink: &mut dyn RecordSink,
) -> VerifyResult<VerifySummary> {
    let file = std::fs::File::open(path).map_err(|source| Error::OpenTrace {
        path: PathBuf::from(path),
        source,
    })?;
    Verifier::new(config).run(std::io::BufReader::new(file), Some(sink))
}

/// Verify trace text held in memory.
///
/// Convenience function for testing with inline logs.
pub fn verify_str(config: &VerifierConfig, text: &str) -> VerifyResult<VerifySummary> {
    Verifier::new(config).run(text.as_bytes(), None)
}
