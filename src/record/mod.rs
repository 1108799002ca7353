//! Trace line classification and typed records.
//!
//! A trace line is classified by the first recognized bracketed marker it
//! contains ([`RecordCategory::classify`]), then parsed by the grammar for
//! that category ([`Record::parse`]). Parsing is all-or-nothing: a record
//! either has every field its category requires or the line is rejected.
//!
//! # Example
//!
//! ```
//! use rts_verify::{Record, RecordCategory, Timestamp};
//!
//! let line = "WT_VERB_RTS[DEBUG_1]: [INIT] rollback to stable with stable_timestamp=(7, 100)";
//! assert_eq!(RecordCategory::classify(line), RecordCategory::Init);
//!
//! let Record::Init(init) = Record::from_line(line)? else { unreachable!() };
//! assert_eq!(init.stable(), Timestamp::new(7, 100));
//! # Ok::<(), rts_verify::ParseError>(())
//! ```

mod grammar;

use crate::error::ParseError;
use crate::types::{PrepareState, TimeWindow, Timestamp, TreeDecisionInputs, UpdateDisposition};
use grammar::{Address, Fields, Relation, TimePoint};
use serde::Serialize;
use std::fmt;

/// Declares the closed set of record categories, in classification
/// priority order, with the literal each one is logged under.
macro_rules! record_categories {
    ($( $(#[$doc:meta])* $variant:ident => $name:literal, )+) => {
        /// Kind of trace line, decided by its literal marker.
        ///
        /// Not to be confused with [`UpdateDisposition`], which classifies updates.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum RecordCategory {
            $( $(#[$doc])* $variant, )+
            /// Carries the trace marker but none of the recognized category markers.
            Unknown,
        }

        impl RecordCategory {
            /// Recognized categories, in classification priority order.
            pub const RECOGNIZED: &'static [RecordCategory] = &[$( RecordCategory::$variant, )+];

            pub fn name(self) -> &'static str {
                match self {
                    $( RecordCategory::$variant => $name, )+
                    RecordCategory::Unknown => "UNKNOWN",
                }
            }

            /// The literal marker identifying this category in a trace line.
            pub fn marker(self) -> Option<&'static str> {
                match self {
                    $( RecordCategory::$variant => Some(concat!("[", $name, "]")), )+
                    RecordCategory::Unknown => None,
                }
            }
        }
    };
}

record_categories! {
    Init => "INIT",
    Tree => "TREE",
    TreeLogging => "TREE_LOGGING",
    TreeSkip => "TREE_SKIP",
    PageRollback => "PAGE_ROLLBACK",
    UpdateAbort => "UPDATE_ABORT",
    HsUpdateAbort => "HS_UPDATE_ABORT",
    HsUpdateValid => "HS_UPDATE_VALID",
    PageAbortCheck => "PAGE_ABORT_CHECK",
    KeyClearRemove => "KEY_CLEAR_REMOVE",
    OndiskKvRemove => "ONDISK_KV_REMOVE",
    /// Announces a shutdown-time pass and its stable timestamp.
    ShutdownInit => "SHUTDOWN_INIT",
    SkipDelNull => "SKIP_DEL_NULL",
    OndiskAbortTw => "ONDISK_ABORT_TW",
    OndiskKeyRollback => "ONDISK_KEY_ROLLBACK",
    HsUpdateRestored => "HS_UPDATE_RESTORED",
    KeyRemoved => "KEY_REMOVED",
    StablePgWalkSkip => "STABLE_PG_WALK_SKIP",
    SkipUnmodified => "SKIP_UNMODIFIED",
    HsGtOndisk => "HS_GT_ONDISK",
    /// Announces a recovery-time pass and its stable timestamp.
    RecoveryRts => "RECOVERY_RTS",
    HsStopObsolete => "HS_STOP_OBSOLETE",
    /// The checkpoint snapshot recovery started from.
    RecoverCkpt => "RECOVER_CKPT",
    HsTreeRollback => "HS_TREE_ROLLBACK",
    HsTreeSkip => "HS_TREE_SKIP",
    HsAbortStop => "HS_ABORT_STOP",
    HsRestoreTombstone => "HS_RESTORE_TOMBSTONE",
    FileSkip => "FILE_SKIP",
}

impl RecordCategory {
    /// Classify a trace line by the first recognized marker it contains.
    pub fn classify(line: &str) -> Self {
        Self::RECOGNIZED
            .iter()
            .copied()
            .find(|category| category.marker().is_some_and(|m| line.contains(m)))
            .unwrap_or(RecordCategory::Unknown)
    }

    /// Categories logged ahead of `[INIT]` while a pass is being set up.
    pub fn is_preamble(self) -> bool {
        matches!(
            self,
            RecordCategory::RecoveryRts | RecordCategory::ShutdownInit | RecordCategory::RecoverCkpt
        )
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `[INIT]`: the stable timestamp RTS runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitRecord {
    pub stable_txn_id: u64,
    pub stable_ts: u64,
}

impl InitRecord {
    pub fn stable(&self) -> Timestamp {
        Timestamp::new(self.stable_txn_id, self.stable_ts)
    }
}

/// `[TREE]`: the engine's decision inputs for rolling back one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeRecord {
    pub file: Option<String>,
    pub modified: bool,
    pub durable_ts: Timestamp,
    pub stable_ts: Timestamp,
    /// Engine-computed `durable_ts > stable_ts`.
    pub durable_gt_stable: bool,
    pub has_prepared_updates: bool,
    pub durable_ts_not_found: bool,
    pub txnid: u64,
    pub recovery_ckpt_snap_min: u64,
    /// Engine-computed `txnid > recovery_ckpt_snap_min`.
    pub txnid_gt_recov_ckpt_snap_min: bool,
}

impl TreeRecord {
    pub fn decision_inputs(&self) -> TreeDecisionInputs {
        TreeDecisionInputs {
            modified: self.modified,
            durable_gt_stable: self.durable_gt_stable,
            has_prepared_updates: self.has_prepared_updates,
            durable_ts_not_found: self.durable_ts_not_found,
            txnid_gt_recov_ckpt_snap_min: self.txnid_gt_recov_ckpt_snap_min,
        }
    }
}

/// `[TREE_LOGGING]`: logging configuration of a tree and its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeLoggingRecord {
    pub file: Option<String>,
    pub conn_logging_enabled: bool,
    pub btree_logging_enabled: bool,
}

/// `[TREE_SKIP]`: a tree left untouched by RTS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeSkipRecord {
    pub file: String,
    pub durable_ts: Timestamp,
    pub stable_ts: Timestamp,
    pub txnid: u64,
}

/// `[PAGE_ROLLBACK]`: a page selected for rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRollbackRecord {
    pub file: String,
    pub addr: u64,
    pub modified: bool,
}

/// `[UPDATE_ABORT]`: an in-memory update discarded by RTS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateAbortRecord {
    pub file: String,
    pub txnid: u64,
    pub txnid_not_visible: bool,
    pub stable_ts: Timestamp,
    pub durable_ts: Timestamp,
    /// Engine-computed `stable_ts < durable_ts`.
    pub stable_lt_durable: bool,
    pub prepare_state: PrepareState,
}

/// `[HS_UPDATE_ABORT]` and `[HS_UPDATE_VALID]`: a history store update
/// discarded or kept while restoring a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsUpdateRecord {
    pub file: String,
    pub time_window: TimeWindow,
    pub update_type: UpdateDisposition,
    pub stable_ts: Timestamp,
}

/// `[PAGE_ABORT_CHECK]`: the engine's verdict on whether a page holds
/// anything to abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageAbortCheckRecord {
    pub file: String,
    pub ref_addr: u64,
    pub durable_ts: Timestamp,
    pub newest_txn: u64,
    pub has_prepared: bool,
    pub needs_abort: bool,
}

/// `[KEY_CLEAR_REMOVE]`: a key restored from one update after removing
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyClearRemoveRecord {
    pub file: String,
    pub restored_commit_ts: Timestamp,
    pub restored_durable_ts: Timestamp,
    pub restored_stable_ts: Timestamp,
    pub restored_txnid: u64,
    pub removed_commit_ts: Timestamp,
    pub removed_durable_ts: Timestamp,
    pub removed_txnid: u64,
    pub removed_prepared: bool,
}

/// `[ONDISK_KV_REMOVE]`: an on-disk key/value removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OndiskKvRemoveRecord {
    pub file: String,
    pub tombstone: bool,
    pub key: u64,
}

/// `[SHUTDOWN_INIT]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownInitRecord {
    pub stable_ts: Timestamp,
}

/// A page skipped by reference: `[SKIP_DEL_NULL]`, `[STABLE_PG_WALK_SKIP]`
/// and `[SKIP_UNMODIFIED]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRefRecord {
    pub file: String,
    pub ref_addr: u64,
}

/// `[ONDISK_ABORT_TW]`: an on-disk value aborted by its time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OndiskAbortTwRecord {
    pub file: String,
    pub start: Timestamp,
    pub durable_start: Timestamp,
    pub start_txn: u64,
    /// Engine-computed `durable_start > stable`.
    pub durable_gt_stable: bool,
    pub txnid_not_visible: bool,
    pub tw_has_no_stop_and_is_prepared: bool,
}

/// `[ONDISK_KEY_ROLLBACK]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    pub file: String,
    pub key: u64,
}

/// A record that only names its tree: `[KEY_REMOVED]` and `[FILE_SKIP]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file: String,
}

/// An update restored from the history store: `[HS_UPDATE_RESTORED]` and
/// `[HS_RESTORE_TOMBSTONE]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsRestoreRecord {
    pub file: String,
    pub txnid: u64,
    pub start_ts: Timestamp,
    pub durable_ts: Timestamp,
}

/// `[HS_GT_ONDISK]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsGtOndiskRecord {
    pub file: String,
    pub time_window: TimeWindow,
    pub update_type: UpdateDisposition,
}

/// `[RECOVERY_RTS]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryRtsRecord {
    pub stable_ts: Timestamp,
    pub oldest_ts: Timestamp,
}

/// `[HS_STOP_OBSOLETE]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsStopObsoleteRecord {
    pub file: String,
    pub time_window: TimeWindow,
    pub pinned_ts: Timestamp,
}

/// `[RECOVER_CKPT]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoverCkptRecord {
    pub snapshot_min: u64,
    pub snapshot_max: u64,
    pub snapshot_count: u64,
}

/// `[HS_TREE_ROLLBACK]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsTreeRollbackRecord {
    pub file: String,
    pub durable_ts: Timestamp,
}

/// `[HS_TREE_SKIP]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsTreeSkipRecord {
    pub file: String,
    pub durable_ts: Timestamp,
    pub stable_ts: Timestamp,
}

/// `[HS_ABORT_STOP]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsAbortStopRecord {
    pub file: String,
    pub durable_start: Timestamp,
    pub commit_start: Timestamp,
    pub durable_stop: Timestamp,
    pub commit_stop: Timestamp,
    pub stable_ts: Timestamp,
}

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Record {
    Init(InitRecord),
    Tree(TreeRecord),
    TreeLogging(TreeLoggingRecord),
    TreeSkip(TreeSkipRecord),
    PageRollback(PageRollbackRecord),
    UpdateAbort(UpdateAbortRecord),
    HsUpdateAbort(HsUpdateRecord),
    HsUpdateValid(HsUpdateRecord),
    PageAbortCheck(PageAbortCheckRecord),
    KeyClearRemove(KeyClearRemoveRecord),
    OndiskKvRemove(OndiskKvRemoveRecord),
    ShutdownInit(ShutdownInitRecord),
    SkipDelNull(PageRefRecord),
    OndiskAbortTw(OndiskAbortTwRecord),
    OndiskKeyRollback(KeyRecord),
    HsUpdateRestored(HsRestoreRecord),
    KeyRemoved(FileRecord),
    StablePgWalkSkip(PageRefRecord),
    SkipUnmodified(PageRefRecord),
    HsGtOndisk(HsGtOndiskRecord),
    RecoveryRts(RecoveryRtsRecord),
    HsStopObsolete(HsStopObsoleteRecord),
    RecoverCkpt(RecoverCkptRecord),
    HsTreeRollback(HsTreeRollbackRecord),
    HsTreeSkip(HsTreeSkipRecord),
    HsAbortStop(HsAbortStopRecord),
    HsRestoreTombstone(HsRestoreRecord),
    FileSkip(FileRecord),
    Unknown { line: String },
}

impl Record {
    /// Classify and parse a trace line.
    pub fn from_line(line: &str) -> Result<Self, ParseError> {
        Self::parse(line, RecordCategory::classify(line))
    }

    /// Parse a trace line whose category has already been decided.
    pub fn parse(line: &str, category: RecordCategory) -> Result<Self, ParseError> {
        use RecordCategory as C;

        let Some(marker) = category.marker() else {
            return Ok(Record::Unknown {
                line: line.to_string(),
            });
        };
        let marker_start = line.find(marker).ok_or(ParseError::MissingMarker { marker })?;
        let fields = Fields::new(
            category.name(),
            &line[..marker_start],
            &line[marker_start + marker.len()..],
        );

        let record = match category {
            C::Init => {
                let stable: Timestamp = fields.get("stable_timestamp")?;
                Record::Init(InitRecord {
                    stable_txn_id: stable.start,
                    stable_ts: stable.stop,
                })
            }
            C::Tree => Record::Tree(parse_tree(&fields)?),
            C::TreeLogging => Record::TreeLogging(TreeLoggingRecord {
                file: fields.file_opt()?,
                conn_logging_enabled: fields.get("connection_logging_enabled")?,
                btree_logging_enabled: fields.get("btree_logging_enabled")?,
            }),
            C::TreeSkip => Record::TreeSkip(TreeSkipRecord {
                file: fields.file()?,
                durable_ts: fields.get("durable_timestamp")?,
                stable_ts: fields.get("stable_timestamp")?,
                txnid: fields.get("txnid")?,
            }),
            C::PageRollback => {
                let Address(addr) = fields.get("addr")?;
                Record::PageRollback(PageRollbackRecord {
                    file: fields.file()?,
                    addr,
                    modified: fields.get("modified")?,
                })
            }
            C::UpdateAbort => {
                let stable_lt_durable: Relation<Timestamp> =
                    fields.relation("stable_timestamp", '<', "durable_timestamp")?;
                Record::UpdateAbort(UpdateAbortRecord {
                    file: fields.file()?,
                    txnid: fields.get("txnid")?,
                    txnid_not_visible: fields.get("txnid_not_visible")?,
                    stable_ts: stable_lt_durable.lhs,
                    durable_ts: stable_lt_durable.rhs,
                    stable_lt_durable: stable_lt_durable.reported,
                    prepare_state: fields.get("prepare_state")?,
                })
            }
            C::HsUpdateAbort => Record::HsUpdateAbort(parse_hs_update(&fields)?),
            C::HsUpdateValid => Record::HsUpdateValid(parse_hs_update(&fields)?),
            C::PageAbortCheck => {
                let Address(ref_addr) = fields.get("ref")?;
                Record::PageAbortCheck(PageAbortCheckRecord {
                    file: fields.file()?,
                    ref_addr,
                    durable_ts: fields.get("durable_timestamp")?,
                    newest_txn: fields.get("newest_txn")?,
                    has_prepared: fields.get("prepared_updates")?,
                    needs_abort: fields.get("needs_abort")?,
                })
            }
            C::KeyClearRemove => Record::KeyClearRemove(parse_key_clear_remove(&fields)?),
            C::OndiskKvRemove => Record::OndiskKvRemove(OndiskKvRemoveRecord {
                file: fields.file()?,
                tombstone: fields.get("tombstone")?,
                key: fields.get("key")?,
            }),
            C::ShutdownInit => Record::ShutdownInit(ShutdownInitRecord {
                stable_ts: fields.get("stable_timestamp")?,
            }),
            C::SkipDelNull => Record::SkipDelNull(parse_page_ref(&fields)?),
            C::OndiskAbortTw => {
                let window: TimePoint = fields.get("time_window")?;
                Record::OndiskAbortTw(OndiskAbortTwRecord {
                    file: fields.file()?,
                    start: window.first,
                    durable_start: window.second,
                    start_txn: window.txn,
                    durable_gt_stable: fields.flag("durable_timestamp > stable_timestamp")?,
                    txnid_not_visible: fields.get("txnid_not_visible")?,
                    tw_has_no_stop_and_is_prepared: fields.get("tw_has_no_stop_and_is_prepared")?,
                })
            }
            C::OndiskKeyRollback => Record::OndiskKeyRollback(KeyRecord {
                file: fields.file()?,
                key: fields.get("key")?,
            }),
            C::HsUpdateRestored => Record::HsUpdateRestored(parse_hs_restore(&fields)?),
            C::KeyRemoved => Record::KeyRemoved(FileRecord {
                file: fields.file()?,
            }),
            C::StablePgWalkSkip => Record::StablePgWalkSkip(parse_page_ref(&fields)?),
            C::SkipUnmodified => Record::SkipUnmodified(parse_page_ref(&fields)?),
            C::HsGtOndisk => Record::HsGtOndisk(HsGtOndiskRecord {
                file: fields.file()?,
                time_window: fields.get("time_window")?,
                update_type: fields.get("type")?,
            }),
            C::RecoveryRts => Record::RecoveryRts(RecoveryRtsRecord {
                stable_ts: fields.get("stable_timestamp")?,
                oldest_ts: fields.get("oldest_timestamp")?,
            }),
            C::HsStopObsolete => Record::HsStopObsolete(HsStopObsoleteRecord {
                file: fields.file()?,
                time_window: fields.get("time_window")?,
                pinned_ts: fields.get("pinned_timestamp")?,
            }),
            C::RecoverCkpt => Record::RecoverCkpt(RecoverCkptRecord {
                snapshot_min: fields.get("snapshot_min")?,
                snapshot_max: fields.get("snapshot_max")?,
                snapshot_count: fields.get("snapshot_count")?,
            }),
            C::HsTreeRollback => Record::HsTreeRollback(HsTreeRollbackRecord {
                file: fields.file()?,
                durable_ts: fields.get("durable_timestamp")?,
            }),
            C::HsTreeSkip => Record::HsTreeSkip(HsTreeSkipRecord {
                file: fields.file()?,
                durable_ts: fields.get("durable_timestamp")?,
                stable_ts: fields.get("stable_timestamp")?,
            }),
            C::HsAbortStop => {
                let (durable_start, commit_start): (Timestamp, Timestamp) =
                    fields.get("start_durable/commit_timestamp")?;
                let (durable_stop, commit_stop): (Timestamp, Timestamp) =
                    fields.get("stop_durable/commit_timestamp")?;
                Record::HsAbortStop(HsAbortStopRecord {
                    file: fields.file()?,
                    durable_start,
                    commit_start,
                    durable_stop,
                    commit_stop,
                    stable_ts: fields.get("stable_timestamp")?,
                })
            }
            C::HsRestoreTombstone => Record::HsRestoreTombstone(parse_hs_restore(&fields)?),
            C::FileSkip => Record::FileSkip(FileRecord {
                file: fields.file()?,
            }),
            C::Unknown => Record::Unknown {
                line: line.to_string(),
            },
        };
        Ok(record)
    }

    pub fn category(&self) -> RecordCategory {
        use RecordCategory as C;

        match self {
            Record::Init(_) => C::Init,
            Record::Tree(_) => C::Tree,
            Record::TreeLogging(_) => C::TreeLogging,
            Record::TreeSkip(_) => C::TreeSkip,
            Record::PageRollback(_) => C::PageRollback,
            Record::UpdateAbort(_) => C::UpdateAbort,
            Record::HsUpdateAbort(_) => C::HsUpdateAbort,
            Record::HsUpdateValid(_) => C::HsUpdateValid,
            Record::PageAbortCheck(_) => C::PageAbortCheck,
            Record::KeyClearRemove(_) => C::KeyClearRemove,
            Record::OndiskKvRemove(_) => C::OndiskKvRemove,
            Record::ShutdownInit(_) => C::ShutdownInit,
            Record::SkipDelNull(_) => C::SkipDelNull,
            Record::OndiskAbortTw(_) => C::OndiskAbortTw,
            Record::OndiskKeyRollback(_) => C::OndiskKeyRollback,
            Record::HsUpdateRestored(_) => C::HsUpdateRestored,
            Record::KeyRemoved(_) => C::KeyRemoved,
            Record::StablePgWalkSkip(_) => C::StablePgWalkSkip,
            Record::SkipUnmodified(_) => C::SkipUnmodified,
            Record::HsGtOndisk(_) => C::HsGtOndisk,
            Record::RecoveryRts(_) => C::RecoveryRts,
            Record::HsStopObsolete(_) => C::HsStopObsolete,
            Record::RecoverCkpt(_) => C::RecoverCkpt,
            Record::HsTreeRollback(_) => C::HsTreeRollback,
            Record::HsTreeSkip(_) => C::HsTreeSkip,
            Record::HsAbortStop(_) => C::HsAbortStop,
            Record::HsRestoreTombstone(_) => C::HsRestoreTombstone,
            Record::FileSkip(_) => C::FileSkip,
            Record::Unknown { .. } => C::Unknown,
        }
    }

    /// File of the tree this record is about, if it names one.
    pub fn file(&self) -> Option<&str> {
        match self {
            Record::Tree(r) => r.file.as_deref(),
            Record::TreeLogging(r) => r.file.as_deref(),
            Record::TreeSkip(r) => Some(&r.file),
            Record::PageRollback(r) => Some(&r.file),
            Record::UpdateAbort(r) => Some(&r.file),
            Record::HsUpdateAbort(r) | Record::HsUpdateValid(r) => Some(&r.file),
            Record::PageAbortCheck(r) => Some(&r.file),
            Record::KeyClearRemove(r) => Some(&r.file),
            Record::OndiskKvRemove(r) => Some(&r.file),
            Record::SkipDelNull(r) | Record::StablePgWalkSkip(r) | Record::SkipUnmodified(r) => {
                Some(&r.file)
            }
            Record::OndiskAbortTw(r) => Some(&r.file),
            Record::OndiskKeyRollback(r) => Some(&r.file),
            Record::HsUpdateRestored(r) | Record::HsRestoreTombstone(r) => Some(&r.file),
            Record::KeyRemoved(r) | Record::FileSkip(r) => Some(&r.file),
            Record::HsGtOndisk(r) => Some(&r.file),
            Record::HsStopObsolete(r) => Some(&r.file),
            Record::HsTreeRollback(r) => Some(&r.file),
            Record::HsTreeSkip(r) => Some(&r.file),
            Record::HsAbortStop(r) => Some(&r.file),
            Record::Init(_)
            | Record::ShutdownInit(_)
            | Record::RecoveryRts(_)
            | Record::RecoverCkpt(_)
            | Record::Unknown { .. } => None,
        }
    }
}

fn parse_tree(fields: &Fields<'_>) -> Result<TreeRecord, ParseError> {
    let durable_gt_stable: Relation<Timestamp> =
        fields.relation("durable_timestamp", '>', "stable_timestamp")?;
    let txnid_gt_snap_min: Relation<u64> =
        fields.relation("txnid", '>', "recovery_checkpoint_snap_min")?;

    Ok(TreeRecord {
        file: fields.file_opt()?,
        modified: fields.get("modified")?,
        durable_ts: durable_gt_stable.lhs,
        stable_ts: durable_gt_stable.rhs,
        durable_gt_stable: durable_gt_stable.reported,
        has_prepared_updates: fields.get("has_prepared_updates")?,
        durable_ts_not_found: fields.get("durable_timestamp_not_found")?,
        txnid: txnid_gt_snap_min.lhs,
        recovery_ckpt_snap_min: txnid_gt_snap_min.rhs,
        txnid_gt_recov_ckpt_snap_min: txnid_gt_snap_min.reported,
    })
}

fn parse_hs_update(fields: &Fields<'_>) -> Result<HsUpdateRecord, ParseError> {
    Ok(HsUpdateRecord {
        file: fields.file()?,
        time_window: fields.get("time_window")?,
        update_type: fields.get("type")?,
        stable_ts: fields.get("stable_timestamp")?,
    })
}

fn parse_page_ref(fields: &Fields<'_>) -> Result<PageRefRecord, ParseError> {
    let Address(ref_addr) = fields.get("ref")?;
    Ok(PageRefRecord {
        file: fields.file()?,
        ref_addr,
    })
}

fn parse_hs_restore(fields: &Fields<'_>) -> Result<HsRestoreRecord, ParseError> {
    Ok(HsRestoreRecord {
        file: fields.file()?,
        txnid: fields.get("txnid")?,
        start_ts: fields.get("start_ts")?,
        durable_ts: fields.get("durable_ts")?,
    })
}

/// The restored update's keys come first, then the same keys again for the
/// removed one after the word `removed`.
fn parse_key_clear_remove(fields: &Fields<'_>) -> Result<KeyClearRemoveRecord, ParseError> {
    let (restored, removed) = fields.split("removed")?;
    Ok(KeyClearRemoveRecord {
        file: fields.file()?,
        restored_commit_ts: restored.get("commit_timestamp")?,
        restored_durable_ts: restored.get("durable_timestamp")?,
        restored_stable_ts: restored.get("stable_timestamp")?,
        restored_txnid: restored.get("txnid")?,
        removed_commit_ts: removed.get("commit_timestamp")?,
        removed_durable_ts: removed.get("durable_timestamp")?,
        removed_txnid: removed.get("txnid")?,
        removed_prepared: removed.get("prepared")?,
    })
}
