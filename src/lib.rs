//! rts-verify: post-hoc verification of rollback-to-stable (RTS) traces.
//!
//! A storage engine running RTS writes verbose trace lines describing what
//! it decided for each tree, page and update. This crate replays such a log
//! after the fact and checks every claim against invariants that span the
//! whole pass:
//!
//! - the stable timestamp is set exactly once, by a single `[INIT]` record,
//!   and every later record agrees with it;
//! - relational flags the engine computed itself (`durable > stable`,
//!   `txnid > snap_min`, `stable < durable`) match a recomputation from the
//!   values on the same line;
//! - btree logging implies connection logging;
//! - a tree is either rolled back or skipped; a skipped tree is stable and
//!   its `[TREE]` inputs did not call for rollback;
//! - neither skipped nor logged trees see page, key or update rollback;
//! - aborted updates and on-disk values were unstable, invisible or
//!   prepared, and kept history updates are stable;
//! - preamble records agree with `[INIT]` on the stable timestamp and with
//!   each `[TREE]` on the recovery checkpoint snapshot.
//!
//! Verification is all-or-nothing: the first unparsable line, unrecognized
//! trace line or violated invariant ends the run with an [`Error`].
//!
//! # Quick Start
//!
//! ```
//! use rts_verify::{verify_str, VerifierConfig};
//!
//! let log = "\
//! WT_VERB_RTS [INIT] rollback to stable with stable_timestamp=(5, 9)
//! WT_VERB_RTS [TREE] file:a.wt; modified=true, durable_timestamp=(5, 10) > stable_timestamp=(5, 9): true, has_prepared_updates=false, durable_timestamp_not_found=false, txnid=12 > recovery_checkpoint_snap_min=8: true
//! ";
//!
//! let summary = verify_str(&VerifierConfig::default(), log)?;
//! assert_eq!(summary.trace_lines, 2);
//! # Ok::<(), rts_verify::Error>(())
//! ```

pub mod checker;
pub mod emitter;
pub mod error;
pub mod record;
pub mod types;
pub mod verify;

// Re-export core types for convenience
pub use checker::{CheckSummary, Checker};
pub use emitter::RecordEmitter;
pub use error::{CheckError, Error, ParseError, RecordError, VerifyResult};
pub use record::{
    FileRecord, HsAbortStopRecord, HsGtOndiskRecord, HsRestoreRecord, HsStopObsoleteRecord,
    HsTreeRollbackRecord, HsTreeSkipRecord, HsUpdateRecord, InitRecord, KeyClearRemoveRecord,
    KeyRecord, OndiskAbortTwRecord, OndiskKvRemoveRecord, PageAbortCheckRecord, PageRefRecord,
    PageRollbackRecord, Record, RecordCategory, RecoverCkptRecord, RecoveryRtsRecord,
    ShutdownInitRecord, TreeLoggingRecord, TreeRecord, TreeSkipRecord, UpdateAbortRecord,
};
pub use types::{
    Page, PrepareState, TimeWindow, Timestamp, Tree, TreeDecisionInputs, UpdateDisposition,
};
pub use verify::{
    verify_file, verify_file_with_sink, verify_str, RecordSink, Verifier, VerifierConfig,
    VerifierConfigBuilder, VerifySummary, DEFAULT_TRACE_MARKER,
};
