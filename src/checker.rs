//! Invariant-checking state machine.
//!
//! One [`Checker`] consumes the records of one RTS pass in file order. It
//! holds the stable timestamp set by the single `[INIT]` record and what it
//! has learned about each tree and page, and rejects the first record that
//! contradicts either the record's own claims or the state built up so far.
//!
//! Engine-computed relational flags (`durable > stable`, `txnid >
//! snap_min`, `stable < durable`) are never trusted: each is recomputed from
//! the values on the same line and a disagreement is a
//! [`CheckError::CrossCheck`].

use crate::error::CheckError;
use crate::record::{
    HsAbortStopRecord, HsTreeSkipRecord, HsUpdateRecord, KeyClearRemoveRecord,
    OndiskAbortTwRecord, PageAbortCheckRecord, PageRollbackRecord, Record, RecordCategory,
    TreeLoggingRecord, TreeRecord, TreeSkipRecord, UpdateAbortRecord,
};
use crate::types::{Page, PrepareState, Timestamp, Tree};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// Counters describing what a checker has accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Stable timestamp set by `[INIT]`, if one was seen.
    pub stable: Option<Timestamp>,
    /// Accepted records per category.
    pub records: BTreeMap<RecordCategory, usize>,
    pub trees: usize,
    pub trees_rolled_back: usize,
    pub trees_skipped: usize,
    pub pages: usize,
    pub page_rollbacks: usize,
}

#[derive(Debug)]
pub struct Checker {
    require_init_first: bool,
    /// `(stable_txn_id, stable_ts)` from the `[INIT]` record.
    stable: Option<Timestamp>,
    /// Stable timestamps announced by preamble records before `[INIT]`.
    announced: Vec<(RecordCategory, Timestamp)>,
    /// `snapshot_min` from `[RECOVER_CKPT]`.
    checkpoint_snap_min: Option<u64>,
    trees: HashSet<Tree>,
    pages: HashSet<Page>,
    records: BTreeMap<RecordCategory, usize>,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Checker {
    /// Create a checker. With `require_init_first`, any record other than
    /// `[INIT]` or a preamble record arriving before `[INIT]` is rejected;
    /// without it, checks against the global stable timestamp are skipped
    /// until it is known.
    pub fn new(require_init_first: bool) -> Self {
        Self {
            require_init_first,
            stable: None,
            announced: Vec::new(),
            checkpoint_snap_min: None,
            trees: HashSet::new(),
            pages: HashSet::new(),
            records: BTreeMap::new(),
        }
    }

    /// Apply one record, updating state or reporting the violation.
    pub fn apply(&mut self, record: &Record) -> Result<(), CheckError> {
        let category = record.category();
        match record {
            Record::Init(init) => self.apply_init(init.stable())?,
            Record::RecoveryRts(r) => self.announce_stable(category, r.stable_ts)?,
            Record::ShutdownInit(r) => self.announce_stable(category, r.stable_ts)?,
            Record::RecoverCkpt(r) => self.apply_recover_ckpt(r.snapshot_min)?,
            Record::Tree(tree) => self.apply_tree(tree)?,
            Record::TreeLogging(logging) => self.apply_tree_logging(logging)?,
            Record::TreeSkip(skip) => self.apply_tree_skip(skip)?,
            Record::FileSkip(r) => {
                self.require_init(category)?;
                self.skip_tree(&r.file)?;
            }
            Record::PageRollback(page) => self.apply_page_rollback(page)?,
            Record::UpdateAbort(abort) => self.apply_update_abort(abort)?,
            Record::HsUpdateAbort(hs) | Record::HsUpdateValid(hs) => {
                self.apply_hs_update(category, hs)?
            }
            Record::PageAbortCheck(check) => self.apply_page_abort_check(check)?,
            Record::KeyClearRemove(key) => self.apply_key_clear_remove(key)?,
            Record::OndiskAbortTw(abort) => self.apply_ondisk_abort_tw(abort)?,
            Record::HsTreeRollback(r) => {
                self.require_init(category)?;
                self.with_tree(&r.file, |tree| {
                    if tree.skipped {
                        return Err(CheckError::ConflictingTreeDecision {
                            file: tree.file.clone(),
                        });
                    }
                    tree.rolled_back = true;
                    Ok(())
                })?;
            }
            Record::HsTreeSkip(skip) => self.apply_hs_tree_skip(skip)?,
            Record::HsAbortStop(hs) => self.apply_hs_abort_stop(hs)?,
            Record::OndiskKvRemove(r) => self.rollback_work(category, &r.file)?,
            Record::OndiskKeyRollback(r) => self.rollback_work(category, &r.file)?,
            Record::KeyRemoved(r) => self.rollback_work(category, &r.file)?,
            Record::HsUpdateRestored(r) | Record::HsRestoreTombstone(r) => {
                self.rollback_work(category, &r.file)?
            }
            Record::SkipDelNull(r) | Record::StablePgWalkSkip(r) | Record::SkipUnmodified(r) => {
                self.walk(category, &r.file)?
            }
            Record::HsGtOndisk(r) => self.walk(category, &r.file)?,
            Record::HsStopObsolete(r) => self.walk(category, &r.file)?,
            Record::Unknown { .. } => return Err(CheckError::UnknownCategory),
        }
        *self.records.entry(category).or_default() += 1;
        Ok(())
    }

    /// Stable timestamp set by `[INIT]`.
    pub fn stable(&self) -> Option<Timestamp> {
        self.stable
    }

    pub fn tree(&self, file: &str) -> Option<&Tree> {
        self.trees.get(file)
    }

    pub fn page(&self, addr: u64) -> Option<&Page> {
        self.pages.get(&addr)
    }

    pub fn summary(&self) -> CheckSummary {
        CheckSummary {
            stable: self.stable,
            records: self.records.clone(),
            trees: self.trees.len(),
            trees_rolled_back: self.trees.iter().filter(|t| t.rolled_back).count(),
            trees_skipped: self.trees.iter().filter(|t| t.skipped).count(),
            pages: self.pages.len(),
            page_rollbacks: self.pages.iter().map(|p| p.rollbacks).sum(),
        }
    }

    fn apply_init(&mut self, stable: Timestamp) -> Result<(), CheckError> {
        if let Some(previous) = self.stable {
            return Err(CheckError::Reinitialization {
                previous,
                found: stable,
            });
        }
        for &(category, announced) in &self.announced {
            check_stable(category, Some(stable), announced)?;
        }
        info!(%stable, "Stable timestamp set");
        self.stable = Some(stable);
        Ok(())
    }

    /// `[RECOVERY_RTS]` and `[SHUTDOWN_INIT]` name the stable timestamp of the
    /// pass they open, which `[INIT]` must repeat.
    fn announce_stable(&mut self, category: RecordCategory, found: Timestamp) -> Result<(), CheckError> {
        match self.stable {
            Some(global) => check_stable(category, Some(global), found),
            None => {
                self.announced.push((category, found));
                Ok(())
            }
        }
    }

    fn apply_recover_ckpt(&mut self, snapshot_min: u64) -> Result<(), CheckError> {
        match self.checkpoint_snap_min {
            Some(checkpoint) if checkpoint != snapshot_min => Err(CheckError::SnapshotMismatch {
                category: RecordCategory::RecoverCkpt.name(),
                checkpoint,
                found: snapshot_min,
            }),
            _ => {
                self.checkpoint_snap_min = Some(snapshot_min);
                Ok(())
            }
        }
    }

    fn apply_tree(&mut self, record: &TreeRecord) -> Result<(), CheckError> {
        let category = RecordCategory::Tree;
        let global = self.require_init(category)?;

        cross_check(
            category,
            record.durable_gt_stable,
            record.durable_ts > record.stable_ts,
            || format!("durable_timestamp={} > stable_timestamp={}", record.durable_ts, record.stable_ts),
        )?;
        cross_check(
            category,
            record.txnid_gt_recov_ckpt_snap_min,
            record.txnid > record.recovery_ckpt_snap_min,
            || {
                format!(
                    "txnid={} > recovery_checkpoint_snap_min={}",
                    record.txnid, record.recovery_ckpt_snap_min
                )
            },
        )?;
        check_stable(category, global, record.stable_ts)?;
        if let Some(checkpoint) = self.checkpoint_snap_min {
            if checkpoint != record.recovery_ckpt_snap_min {
                return Err(CheckError::SnapshotMismatch {
                    category: category.name(),
                    checkpoint,
                    found: record.recovery_ckpt_snap_min,
                });
            }
        }

        if let Some(file) = &record.file {
            let inputs = record.decision_inputs();
            self.with_tree(file, |tree| {
                if tree.skipped {
                    return Err(CheckError::ConflictingTreeDecision {
                        file: tree.file.clone(),
                    });
                }
                tree.inputs = Some(inputs);
                Ok(())
            })?;
            debug!(file = %file, needs_rollback = ?inputs.rollback_reason(), "Tree inputs recorded");
        }
        Ok(())
    }

    fn apply_tree_logging(&mut self, record: &TreeLoggingRecord) -> Result<(), CheckError> {
        self.require_init(RecordCategory::TreeLogging)?;

        if record.btree_logging_enabled && !record.conn_logging_enabled {
            return Err(CheckError::LoggingConfiguration {
                file: record.file.clone(),
            });
        }

        if let Some(file) = &record.file {
            self.with_tree(file, |tree| {
                tree.logged = Some(record.btree_logging_enabled);
                Ok(())
            })?;
        }
        Ok(())
    }

    fn apply_tree_skip(&mut self, record: &TreeSkipRecord) -> Result<(), CheckError> {
        let category = RecordCategory::TreeSkip;
        let global = self.require_init(category)?;
        check_stable(category, global, record.stable_ts)?;

        if record.durable_ts > record.stable_ts {
            return Err(CheckError::UnstableTreeSkipped {
                file: record.file.clone(),
                durable: record.durable_ts,
                stable: record.stable_ts,
            });
        }

        self.skip_tree(&record.file)
    }

    /// A tree may be skipped only if nothing was rolled back in it and none
    /// of its `[TREE]` inputs called for rollback.
    fn skip_tree(&mut self, file: &str) -> Result<(), CheckError> {
        self.with_tree(file, |tree| {
            if tree.rolled_back {
                return Err(CheckError::ConflictingTreeDecision {
                    file: tree.file.clone(),
                });
            }
            if let Some(reason) = tree.inputs.and_then(|inputs| inputs.rollback_reason()) {
                return Err(CheckError::SkippedTreeNeedsRollback {
                    file: tree.file.clone(),
                    reason,
                });
            }
            tree.skipped = true;
            Ok(())
        })?;
        debug!(file = %file, "Tree skipped");
        Ok(())
    }

    fn apply_page_rollback(&mut self, record: &PageRollbackRecord) -> Result<(), CheckError> {
        let category = RecordCategory::PageRollback;
        self.require_init(category)?;
        self.roll_back(category, &record.file)?;

        let mut page = self
            .pages
            .take(&record.addr)
            .unwrap_or_else(|| Page::new(record.addr, record.file.as_str()));
        page.file.clone_from(&record.file);
        page.modified = Some(record.modified);
        page.rollbacks += 1;
        self.pages.insert(page);
        Ok(())
    }

    fn apply_update_abort(&mut self, record: &UpdateAbortRecord) -> Result<(), CheckError> {
        let category = RecordCategory::UpdateAbort;
        let global = self.require_init(category)?;

        let stable_lt_durable = record.stable_ts < record.durable_ts;
        cross_check(category, record.stable_lt_durable, stable_lt_durable, || {
            format!(
                "stable_timestamp={} < durable_timestamp={}",
                record.stable_ts, record.durable_ts
            )
        })?;
        check_stable(category, global, record.stable_ts)?;

        let justified = record.txnid_not_visible
            || stable_lt_durable
            || record.prepare_state == PrepareState::InProgress;
        if !justified {
            return Err(CheckError::UnjustifiedAbort {
                file: record.file.clone(),
                txnid: record.txnid,
                prepare_state: record.prepare_state,
            });
        }

        self.roll_back(category, &record.file)
    }

    fn apply_hs_update(
        &mut self,
        category: RecordCategory,
        record: &HsUpdateRecord,
    ) -> Result<(), CheckError> {
        let global = self.require_init(category)?;
        check_stable(category, global, record.stable_ts)?;

        if category == RecordCategory::HsUpdateValid {
            if record.time_window.durable_start > record.stable_ts {
                return Err(CheckError::UnstableHistoryUpdate {
                    file: record.file.clone(),
                    durable_start: record.time_window.durable_start,
                    stable: record.stable_ts,
                });
            }
            return self.ensure_eligible(category, &record.file);
        }

        self.roll_back(category, &record.file)
    }

    /// A page whose newest update is past stable, or which holds prepared
    /// updates, must be reported as needing abort.
    fn apply_page_abort_check(&mut self, record: &PageAbortCheckRecord) -> Result<(), CheckError> {
        let category = RecordCategory::PageAbortCheck;
        let global = self.require_init(category)?;

        if let Some(stable) = global {
            let required = record.durable_ts > stable || record.has_prepared;
            if required && !record.needs_abort {
                return Err(CheckError::CrossCheck {
                    category: category.name(),
                    relation: format!(
                        "needs_abort with durable_timestamp={} > stable {stable} or prepared_updates={}",
                        record.durable_ts, record.has_prepared
                    ),
                    reported: record.needs_abort,
                    computed: required,
                });
            }
        }
        self.ensure_eligible(category, &record.file)
    }

    fn apply_key_clear_remove(&mut self, record: &KeyClearRemoveRecord) -> Result<(), CheckError> {
        let category = RecordCategory::KeyClearRemove;
        let global = self.require_init(category)?;
        check_stable(category, global, record.restored_stable_ts)?;
        self.roll_back(category, &record.file)
    }

    fn apply_ondisk_abort_tw(&mut self, record: &OndiskAbortTwRecord) -> Result<(), CheckError> {
        let category = RecordCategory::OndiskAbortTw;
        let global = self.require_init(category)?;

        let durable_gt_stable = match global {
            Some(stable) => {
                let computed = record.durable_start > stable;
                cross_check(category, record.durable_gt_stable, computed, || {
                    format!("durable_timestamp={} > stable_timestamp={stable}", record.durable_start)
                })?;
                computed
            }
            None => record.durable_gt_stable,
        };

        let justified = durable_gt_stable
            || record.txnid_not_visible
            || record.tw_has_no_stop_and_is_prepared;
        if !justified {
            return Err(CheckError::UnjustifiedOndiskAbort {
                file: record.file.clone(),
                start_txn: record.start_txn,
            });
        }

        self.roll_back(category, &record.file)
    }

    fn apply_hs_tree_skip(&mut self, record: &HsTreeSkipRecord) -> Result<(), CheckError> {
        let category = RecordCategory::HsTreeSkip;
        let global = self.require_init(category)?;
        check_stable(category, global, record.stable_ts)?;

        if record.durable_ts > record.stable_ts {
            return Err(CheckError::UnstableTreeSkipped {
                file: record.file.clone(),
                durable: record.durable_ts,
                stable: record.stable_ts,
            });
        }
        self.skip_tree(&record.file)
    }

    fn apply_hs_abort_stop(&mut self, record: &HsAbortStopRecord) -> Result<(), CheckError> {
        let category = RecordCategory::HsAbortStop;
        let global = self.require_init(category)?;
        check_stable(category, global, record.stable_ts)?;
        self.roll_back(category, &record.file)
    }

    /// Global stable timestamp, or `None` while relaxed ordering lets a
    /// record through before `[INIT]`.
    fn require_init(&self, category: RecordCategory) -> Result<Option<Timestamp>, CheckError> {
        match self.stable {
            Some(stable) => Ok(Some(stable)),
            None if self.require_init_first => Err(CheckError::MissingInit {
                category: category.name(),
            }),
            None => {
                warn!(%category, "Record before [INIT]; skipping stable timestamp checks");
                Ok(None)
            }
        }
    }

    fn ensure_eligible(&self, category: RecordCategory, file: &str) -> Result<(), CheckError> {
        let Some(tree) = self.trees.get(file) else {
            return Ok(());
        };
        if tree.eligible_for_rollback() {
            return Ok(());
        }
        Err(CheckError::TreeNotEligible {
            category: category.name(),
            file: file.to_string(),
            reason: if tree.skipped { "skipped" } else { "logged" },
        })
    }

    /// A page walk step that inspects a tree without changing it.
    fn walk(&self, category: RecordCategory, file: &str) -> Result<(), CheckError> {
        self.require_init(category)?;
        self.ensure_eligible(category, file)
    }

    fn rollback_work(&mut self, category: RecordCategory, file: &str) -> Result<(), CheckError> {
        self.require_init(category)?;
        self.roll_back(category, file)
    }

    /// Mark rollback work logged against a tree.
    fn roll_back(&mut self, category: RecordCategory, file: &str) -> Result<(), CheckError> {
        self.ensure_eligible(category, file)?;
        self.with_tree(file, |tree| {
            tree.rolled_back = true;
            Ok(())
        })
    }

    fn with_tree<T>(
        &mut self,
        file: &str,
        f: impl FnOnce(&mut Tree) -> Result<T, CheckError>,
    ) -> Result<T, CheckError> {
        let mut tree = self.trees.take(file).unwrap_or_else(|| Tree::new(file));
        let result = f(&mut tree);
        self.trees.insert(tree);
        result
    }
}

fn cross_check(
    category: RecordCategory,
    reported: bool,
    computed: bool,
    relation: impl FnOnce() -> String,
) -> Result<(), CheckError> {
    if reported == computed {
        return Ok(());
    }
    Err(CheckError::CrossCheck {
        category: category.name(),
        relation: relation(),
        reported,
        computed,
    })
}

fn check_stable(
    category: RecordCategory,
    global: Option<Timestamp>,
    found: Timestamp,
) -> Result<(), CheckError> {
    match global {
        Some(global) if global != found => Err(CheckError::StableMismatch {
            category: category.name(),
            global,
            found,
        }),
        _ => Ok(()),
    }
}
