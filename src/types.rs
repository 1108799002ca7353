//! Domain value types shared by the record parser and the checker.
//!
//! Everything here is a plain value: timestamps and time windows, the
//! prepare-state and update-disposition label sets, and the identity-keyed
//! [`Tree`] and [`Page`] entities the checker tracks across a run.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An engine timestamp rendered as a `(start, stop)` pair.
///
/// Ordering is lexicographic over `(start, stop)`, which is exactly what
/// the derived `Ord` gives for this field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Timestamp {
    pub start: u64,
    pub stop: u64,
}

impl Timestamp {
    pub const fn new(start: u64, stop: u64) -> Self {
        Self { start, stop }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start, self.stop)
    }
}

/// Validity window of a history store update.
///
/// Rendered in trace lines as
/// `start: DURABLE_START/START/START_TXN stop: DURABLE_STOP/STOP/STOP_TXN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub durable_start: Timestamp,
    pub start: Timestamp,
    pub start_txn: u64,
    pub durable_stop: Timestamp,
    pub stop: Timestamp,
    pub stop_txn: u64,
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start: {}/{}/{} stop: {}/{}/{}",
            self.durable_start, self.start, self.start_txn, self.durable_stop, self.stop, self.stop_txn
        )
    }
}

/// Lifecycle label of a prepared transaction's update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PrepareState {
    #[serde(rename = "INIT")]
    Init,
    #[serde(rename = "INPROGRESS")]
    InProgress,
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "RESOLVED")]
    Resolved,
}

impl PrepareState {
    /// Resolve a trace label such as `PREPARE_INPROGRESS` or
    /// `WT_PREPARE_INPROGRESS`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.strip_prefix("WT_").unwrap_or(label);
        match label.strip_prefix("PREPARE_")? {
            "INIT" => Some(Self::Init),
            "INPROGRESS" => Some(Self::InProgress),
            "LOCKED" => Some(Self::Locked),
            "RESOLVED" => Some(Self::Resolved),
            _ => None,
        }
    }
}

/// Kind of update found while walking a key's history.
///
/// Not to be confused with [`RecordCategory`](crate::RecordCategory), which
/// classifies trace lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UpdateDisposition {
    Modify,
    Reserve,
    Standard,
    Tombstone,
}

impl UpdateDisposition {
    /// Resolve a trace label such as `UPDATE_TOMBSTONE` or
    /// `WT_UPDATE_TOMBSTONE`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.strip_prefix("WT_").unwrap_or(label);
        match label.strip_prefix("UPDATE_")? {
            "MODIFY" => Some(Self::Modify),
            "RESERVE" => Some(Self::Reserve),
            "STANDARD" => Some(Self::Standard),
            "TOMBSTONE" => Some(Self::Tombstone),
            _ => None,
        }
    }
}

/// The inputs behind the engine's rollback decision for one tree, as
/// reported by `[TREE]`.
///
/// The engine rolls a tree back when any of these holds and may only skip it
/// when none does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TreeDecisionInputs {
    pub modified: bool,
    pub durable_gt_stable: bool,
    pub has_prepared_updates: bool,
    pub durable_ts_not_found: bool,
    pub txnid_gt_recov_ckpt_snap_min: bool,
}

impl TreeDecisionInputs {
    /// Name of the first input that requires rollback, if any.
    pub fn rollback_reason(&self) -> Option<&'static str> {
        [
            (self.modified, "modified"),
            (self.durable_gt_stable, "durable_timestamp > stable_timestamp"),
            (self.has_prepared_updates, "has_prepared_updates"),
            (self.durable_ts_not_found, "durable_timestamp_not_found"),
            (
                self.txnid_gt_recov_ckpt_snap_min,
                "txnid > recovery_checkpoint_snap_min",
            ),
        ]
        .into_iter()
        .find_map(|(set, name)| set.then_some(name))
    }
}

/// A btree, identified by its file name.
///
/// Equality and hashing only look at `file`, so a `HashSet<Tree>` can be
/// looked up by `&str`. The remaining fields are what the checker has
/// learned about the tree so far.
#[derive(Debug, Clone, Serialize)]
pub struct Tree {
    pub file: String,
    /// Decision inputs from the last `[TREE]` record naming this tree.
    pub inputs: Option<TreeDecisionInputs>,
    /// Btree logging status as reported by `[TREE_LOGGING]`.
    pub logged: Option<bool>,
    /// Set once page, key or update work is logged against this tree.
    pub rolled_back: bool,
    /// Set once a `[TREE_SKIP]` or `[FILE_SKIP]` record names this tree.
    pub skipped: bool,
}

impl Tree {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            inputs: None,
            logged: None,
            rolled_back: false,
            skipped: false,
        }
    }

    /// A tree is eligible for page and update rollback unless it was skipped
    /// or is recovered through the log instead.
    pub fn eligible_for_rollback(&self) -> bool {
        !self.skipped && self.logged != Some(true)
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
    }
}

impl Eq for Tree {}

impl Hash for Tree {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
    }
}

impl Borrow<str> for Tree {
    fn borrow(&self) -> &str {
        &self.file
    }
}

/// An in-memory page, identified by its address.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub addr: u64,
    /// File of the tree the page was last rolled back under.
    pub file: String,
    pub modified: Option<bool>,
    pub rollbacks: usize,
}

impl Page {
    pub fn new(addr: u64, file: impl Into<String>) -> Self {
        Self {
            addr,
            file: file.into(),
            modified: None,
            rollbacks: 0,
        }
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl Borrow<u64> for Page {
    fn borrow(&self) -> &u64 {
        &self.addr
    }
}
