//! Typed errors for rts-verify.
//!
//! Every failure is fatal to the run: the driver stops at the first
//! rejected line and reports it through [`Error::Rejected`].

use crate::types::{PrepareState, Timestamp};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a verification run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A trace line failed to parse or violated an invariant.
    #[error("line {line_no}: {reason}\n  {line}")]
    Rejected {
        line_no: usize,
        line: String,
        #[source]
        reason: RecordError,
    },

    /// The trace file could not be opened.
    #[error("Failed to open trace file {path}: {source}")]
    OpenTrace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The underlying record failure, if the run stopped on a trace line.
    pub fn reason(&self) -> Option<&RecordError> {
        match self {
            Error::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Why a single trace line was rejected.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Check failed: {0}")]
    Check(#[from] CheckError),
}

/// A categorized line did not yield every field its category requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A line carrying the trace marker is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// The category marker is absent from the line.
    #[error("line does not contain marker {marker}")]
    MissingMarker { marker: &'static str },

    /// A required field is absent.
    #[error("[{category}] missing field '{field}'")]
    MissingField {
        category: &'static str,
        field: &'static str,
    },

    /// A field is present but its value has the wrong shape.
    #[error("[{category}] field '{field}': expected {expected}, found {found}")]
    MalformedField {
        category: &'static str,
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    /// A field occurs more than once, so its value is ambiguous.
    #[error("[{category}] field '{field}' appears more than once")]
    DuplicateField {
        category: &'static str,
        field: &'static str,
    },

    /// A label field holds a value outside its closed set.
    #[error("[{category}] field '{field}': unknown label '{label}'")]
    UnknownLabel {
        category: &'static str,
        field: &'static str,
        label: String,
    },
}

/// An invariant violation detected while applying a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CheckError {
    /// A trace-tagged line matched no recognized category.
    #[error("Unknown category: trace line matches no recognized record marker")]
    UnknownCategory,

    /// A second `[INIT]` record was seen.
    #[error(
        "Reinitialization: [INIT] with stable timestamp {found} after {previous}; \
         the log holds more than one RTS pass"
    )]
    Reinitialization {
        previous: Timestamp,
        found: Timestamp,
    },

    /// An engine-computed relational flag disagrees with recomputation.
    #[error(
        "Cross-check violation in [{category}]: engine reported `{relation}` as {reported}, \
         recomputed {computed}"
    )]
    CrossCheck {
        category: &'static str,
        relation: String,
        reported: bool,
        computed: bool,
    },

    /// A record's stable timestamp differs from the one set by `[INIT]`.
    #[error("Stable timestamp mismatch in [{category}]: record has {found}, [INIT] set {global}")]
    StableMismatch {
        category: &'static str,
        global: Timestamp,
        found: Timestamp,
    },

    /// A recovery checkpoint snapshot disagrees with one seen earlier.
    #[error(
        "Snapshot mismatch in [{category}]: recovery checkpoint snap_min is {checkpoint}, \
         record has {found}"
    )]
    SnapshotMismatch {
        category: &'static str,
        checkpoint: u64,
        found: u64,
    },

    /// A record arrived before the `[INIT]` record.
    #[error("Missing init: [{category}] record before any [INIT] record")]
    MissingInit { category: &'static str },

    /// Btree logging is enabled while connection logging is not.
    #[error(
        "Logging configuration violation: btree logging enabled while connection logging \
         is disabled"
    )]
    LoggingConfiguration { file: Option<String> },

    /// A tree was skipped although its durable timestamp is newer than stable.
    #[error(
        "Unstable tree skipped: {file} has durable timestamp {durable} newer than stable \
         {stable}"
    )]
    UnstableTreeSkipped {
        file: String,
        durable: Timestamp,
        stable: Timestamp,
    },

    /// A tree was both rolled back and skipped in the same pass.
    #[error("Conflicting tree decision: {file} was both rolled back and skipped")]
    ConflictingTreeDecision { file: String },

    /// A tree was skipped although its `[TREE]` inputs called for rollback.
    #[error("Skipped tree needs rollback: {file} was skipped with {reason} set")]
    SkippedTreeNeedsRollback { file: String, reason: &'static str },

    /// Rollback work was done on a tree that must be left alone.
    #[error("Tree not eligible for rollback: [{category}] on {file}, which was {reason}")]
    TreeNotEligible {
        category: &'static str,
        file: String,
        reason: &'static str,
    },

    /// An update was aborted although it is visible, stable and not prepared.
    #[error(
        "Unjustified abort: update of txn {txnid} on {file} is visible, stable and \
         {prepare_state:?}"
    )]
    UnjustifiedAbort {
        file: String,
        txnid: u64,
        prepare_state: PrepareState,
    },

    /// An on-disk value was aborted although it is stable, visible and not
    /// an unfinished prepare.
    #[error("Unjustified on-disk abort: value of txn {start_txn} on {file} is stable and visible")]
    UnjustifiedOndiskAbort { file: String, start_txn: u64 },

    /// A history store update was kept although it is not yet stable.
    #[error(
        "Unstable history update kept: {file} update with durable start {durable_start} \
         newer than stable {stable}"
    )]
    UnstableHistoryUpdate {
        file: String,
        durable_start: Timestamp,
        stable: Timestamp,
    },
}

/// Result type alias using rts-verify's Error.
pub type VerifyResult<T> = std::result::Result<T, Error>;
