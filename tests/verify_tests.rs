//! End-to-end verification of RTS trace logs.

use std::io::Write;
use rts_verify::*;

const PREFIX: &str = "[1700000000:123456][4242:0x7f5c] WT_VERB_RTS[DEBUG_1]:";

fn write_log(dir: &tempfile::TempDir, filename: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(filename);
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn rts(body: &str) -> String {
    format!("{PREFIX} {body}")
}

fn init(stable: &str) -> String {
    rts(&format!(
        "[INIT] rollback to stable with stable_timestamp={stable} and oldest_timestamp=(1, 0)"
    ))
}

fn tree(file: &str, durable: &str, stable: &str, flag: &str) -> String {
    rts(&format!(
        "[TREE] file:{file}; modified=true, durable_timestamp={durable} > stable_timestamp={stable}: {flag}, \
         has_prepared_updates=false, durable_timestamp_not_found=false, \
         txnid=12 > recovery_checkpoint_snap_min=8: true"
    ))
}

fn tree_logging(file: &str, conn: bool, btree: bool) -> String {
    rts(&format!(
        "[TREE_LOGGING] file:{file}; connection_logging_enabled={conn} and btree_logging_enabled={btree}"
    ))
}

fn verify_lines(lines: &[String]) -> Result<VerifySummary, Error> {
    verify_str(&VerifierConfig::default(), &lines.join("\n"))
}

fn reason(err: &Error) -> &RecordError {
    err.reason().unwrap_or_else(|| panic!("expected a rejected line, got: {err}"))
}

#[test]
fn test_valid_log_passes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_log(
        &dir,
        "rts.log",
        &[
            "[1700000000:000001][4242:0x7f5c] WT_VERB_RECOVERY: opening connection",
            &init("(5, 9)"),
            &tree_logging("a.wt", true, false),
            &tree("a.wt", "(5, 10)", "(5, 9)", "true"),
            &rts("[PAGE_ROLLBACK] file:a.wt; addr=0x55d0c0a1b2c0, modified=true"),
            &rts(
                "[UPDATE_ABORT] file:a.wt; txnid=40, txnid_not_visible=false, \
                 stable_timestamp=(5, 9) < durable_timestamp=(5, 10): true, \
                 prepare_state=WT_PREPARE_INIT",
            ),
            &rts(
                "[TREE_SKIP] file:b.wt; durable_timestamp=(3, 0), stable_timestamp=(5, 9), txnid=7",
            ),
            &rts(
                "[HS_UPDATE_VALID] file:a.wt; history store update valid with \
                 time_window=start: (4, 0)/(4, 0)/30 stop: (0, 0)/(0, 0)/0, \
                 type=WT_UPDATE_STANDARD and stable_timestamp=(5, 9)",
            ),
            &rts(
                "[HS_UPDATE_ABORT] file:a.wt; history store update aborted with \
                 time_window=start: (6, 0)/(6, 0)/31 stop: (0, 0)/(0, 0)/0, \
                 type=WT_UPDATE_TOMBSTONE and stable_timestamp=(5, 9)",
            ),
            "[1700000000:000099][4242:0x7f5c] WT_VERB_RECOVERY: done",
        ],
    );

    let summary = verify_file(&VerifierConfig::default(), &path).unwrap();
    assert_eq!(summary.lines_read, 10);
    assert_eq!(summary.trace_lines, 8);
    assert_eq!(summary.checks.stable, Some(Timestamp::new(5, 9)));
    assert_eq!(summary.checks.trees, 2);
    assert_eq!(summary.checks.trees_rolled_back, 1);
    assert_eq!(summary.checks.trees_skipped, 1);
    assert_eq!(summary.checks.pages, 1);
    assert_eq!(summary.checks.records.get(&RecordCategory::Tree), Some(&1));
}

#[test]
fn test_empty_log_passes() {
    let summary = verify_str(&VerifierConfig::default(), "").unwrap();
    assert_eq!(summary, VerifySummary::default());
}

#[test]
fn test_single_init_then_valid_records_passes() {
    let lines = vec![
        init("(5, 9)"),
        tree("a.wt", "(5, 10)", "(5, 9)", "true"),
        tree("b.wt", "(5, 9)", "(5, 9)", "false"),
        tree_logging("c.wt", true, true),
        tree_logging("d.wt", false, false),
    ];
    verify_lines(&lines).unwrap();
}

#[test]
fn test_second_init_is_reinitialization() {
    let lines = vec![
        rts("[INIT] stable_timestamp=(7, 100)"),
        tree("a.wt", "(7, 101)", "(7, 100)", "true"),
        rts("[INIT] stable_timestamp=(8, 50)"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::Reinitialization { .. })
    ));
    let Error::Rejected { line_no, .. } = err else {
        unreachable!()
    };
    assert_eq!(line_no, 3);
}

#[test]
fn test_three_inits_fail_at_the_second() {
    let lines = vec![
        rts("[INIT] stable_timestamp=(1, 0)"),
        rts("[INIT] stable_timestamp=(1, 0)"),
        rts("[INIT] stable_timestamp=(1, 0)"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    let Error::Rejected { line_no, .. } = err else {
        panic!("expected a rejected line");
    };
    assert_eq!(line_no, 2);
}

#[test]
fn test_durable_gt_stable_flag_agreeing_passes() {
    let lines = vec![init("(5, 9)"), tree("a.wt", "(5, 10)", "(5, 9)", "true")];
    verify_lines(&lines).unwrap();
}

#[test]
fn test_durable_gt_stable_flag_disagreeing_fails() {
    let lines = vec![init("(5, 9)"), tree("a.wt", "(5, 10)", "(5, 9)", "false")];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::CrossCheck { category: "TREE", .. })
    ));

    let err_str = err.to_string();
    assert!(
        err_str.contains("Cross-check") && err_str.contains("durable_timestamp=(5, 10)"),
        "Expected cross-check error, got: {err_str}"
    );
    assert!(err_str.contains("[TREE] file:a.wt"), "offending line missing: {err_str}");
}

#[test]
fn test_equal_timestamps_are_not_greater() {
    let lines = vec![init("(5, 9)"), tree("a.wt", "(5, 9)", "(5, 9)", "true")];
    assert!(verify_lines(&lines).is_err());
}

#[test]
fn test_btree_logging_without_connection_logging_fails() {
    let lines = vec![init("(5, 9)"), tree_logging("a.wt", false, true)];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::LoggingConfiguration { .. })
    ));
}

#[test]
fn test_unknown_trace_line_fails() {
    let lines = vec![init("(5, 9)"), rts("[KEY_FOUND] file:a.wt; key found")];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::UnknownCategory)
    ));
}

#[test]
fn test_untagged_lines_are_ignored() {
    let lines = vec![
        "[TREE] this line has no trace marker and is never parsed".to_string(),
        init("(5, 9)"),
        "garbage".to_string(),
    ];
    let summary = verify_lines(&lines).unwrap();
    assert_eq!(summary.trace_lines, 1);
}

#[test]
fn test_missing_field_is_parse_error() {
    let line = tree("a.wt", "(5, 10)", "(5, 9)", "true").replace("txnid=12 > ", "");
    let lines = vec![init("(5, 9)"), line];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Parse(ParseError::MissingField { field: "txnid", .. })
    ));
}

#[test]
fn test_malformed_boolean_is_parse_error() {
    let lines = vec![init("(5, 9)"), tree_logging("a.wt", true, true).replace("=true and", "=yes and")];
    let err = verify_lines(&lines).unwrap_err();
    let err_str = err.to_string();
    assert!(
        err_str.contains("Parse error") && err_str.contains("true or false"),
        "Expected parse error, got: {err_str}"
    );
}

#[test]
fn test_records_before_init_are_rejected_by_default() {
    let lines = vec![tree("a.wt", "(5, 10)", "(5, 9)", "true"), init("(5, 9)")];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::MissingInit { category: "TREE" })
    ));
}

#[test]
fn test_records_before_init_tolerated_when_relaxed() {
    let config = VerifierConfig::builder().require_init_first(false).build();
    let lines = [
        tree("a.wt", "(5, 10)", "(5, 9)", "true"),
        tree_logging("a.wt", true, true),
        init("(5, 9)"),
        tree("b.wt", "(5, 10)", "(5, 9)", "true"),
    ];
    let summary = verify_str(&config, &lines.join("\n")).unwrap();
    assert_eq!(summary.checks.trees, 2);

    // Record-local recomputation is not relaxed.
    let lines = [tree("a.wt", "(5, 10)", "(5, 9)", "false")];
    assert!(verify_str(&config, &lines.join("\n")).is_err());
}

#[test]
fn test_stable_mismatch_after_init_fails() {
    let lines = vec![init("(5, 9)"), tree("a.wt", "(6, 10)", "(6, 9)", "true")];
    let err = verify_lines(&lines).unwrap_err();
    assert!(err.to_string().contains("Stable timestamp mismatch"), "{err}");
}

#[test]
fn test_page_rollback_on_logged_tree_fails() {
    let lines = vec![
        init("(5, 9)"),
        tree_logging("a.wt", true, true),
        rts("[PAGE_ROLLBACK] file:a.wt; addr=0x1000, modified=false"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::TreeNotEligible { reason: "logged", .. })
    ));
}

#[test]
fn test_unstable_tree_skip_fails() {
    let lines = vec![
        init("(5, 9)"),
        rts("[TREE_SKIP] file:b.wt; durable_timestamp=(9, 0), stable_timestamp=(5, 9), txnid=7"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(err.to_string().contains("Unstable tree skipped"), "{err}");
}

#[test]
fn test_custom_trace_marker() {
    let config = VerifierConfig::from("RTS_TRACE");
    let text = "RTS_TRACE [INIT] stable_timestamp=(1, 1)\nWT_VERB_RTS [INIT] stable_timestamp=(2, 2)\n";
    let summary = verify_str(&config, text).unwrap();
    assert_eq!(summary.trace_lines, 1);
    assert_eq!(summary.checks.stable, Some(Timestamp::new(1, 1)));
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.log");
    let err = verify_file(&VerifierConfig::default(), &path).unwrap_err();
    assert!(matches!(err, Error::OpenTrace { .. }));
    assert!(err.to_string().contains("missing.log"), "{err}");
}

#[test]
fn test_crlf_line_endings() {
    let text = format!("{}\r\n{}\r\n", init("(5, 9)"), tree("a.wt", "(5, 10)", "(5, 9)", "true"));
    verify_str(&VerifierConfig::default(), &text).unwrap();
}

#[test]
fn test_clean_tree_then_tree_skip_passes() {
    let lines = vec![
        init("(5, 9)"),
        rts(
            "[TREE] file:a.wt; modified=false, durable_timestamp=(3, 0) > stable_timestamp=(5, 9): false, \
             has_prepared_updates=false, durable_timestamp_not_found=false, \
             txnid=0 > recovery_checkpoint_snap_min=8: false",
        ),
        rts(
            "[TREE_SKIP] file:a.wt: tree skipped with durable_timestamp=(3, 0) \
             and stable_timestamp=(5, 9) or txnid=0",
        ),
    ];
    let summary = verify_lines(&lines).unwrap();
    assert_eq!(summary.checks.trees, 1);
    assert_eq!(summary.checks.trees_skipped, 1);
    assert_eq!(summary.checks.trees_rolled_back, 0);
}

#[test]
fn test_tree_skip_after_modified_tree_fails() {
    let lines = vec![
        init("(5, 9)"),
        tree("a.wt", "(5, 9)", "(5, 9)", "false"),
        rts("[TREE_SKIP] file:a.wt: tree skipped with durable_timestamp=(5, 9) and stable_timestamp=(5, 9) or txnid=12"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::SkippedTreeNeedsRollback { reason: "modified", .. })
    ));
}

#[test]
fn test_file_in_message_prefix_is_used() {
    let lines = vec![
        init("(5, 9)"),
        tree_logging("a.wt", true, true),
        "[1700000000:123456][4242:0x7f5c], file:a.wt, WT_SESSION.rollback_to_stable: \
         [WT_VERB_RTS][DEBUG_1]: [PAGE_ROLLBACK] rolling back page addr=0x10 modified=true"
            .to_string(),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::TreeNotEligible { reason: "logged", .. })
    ));
    assert!(err.to_string().contains("a.wt"), "{err}");
}

#[test]
fn test_trailing_dot_is_not_part_of_the_value() {
    let lines = vec![
        init("(5, 9)"),
        rts("[TREE_SKIP] file:b.wt; durable_timestamp=(3, 0), stable_timestamp=(5, 9), txnid=12."),
    ];
    verify_lines(&lines).unwrap();
}

#[test]
fn test_recovery_log_with_walk_records_passes() {
    let lines = vec![
        rts("[RECOVERY_RTS] performing recovery rollback to stable with stable_timestamp=(5, 9) and oldest_timestamp=(1, 0)"),
        rts("[RECOVER_CKPT] recovery checkpoint snapshot_min=8, snapshot_max=12, snapshot_count=2"),
        init("(5, 9)"),
        rts("[FILE_SKIP] file:c.wt; skipping file"),
        tree("a.wt", "(5, 10)", "(5, 9)", "true"),
        rts("[PAGE_ABORT_CHECK] file:a.wt; ref=0x40: durable_timestamp=(5, 10), newest_txn=12, prepared_updates=false, needs_abort=true"),
        rts("[STABLE_PG_WALK_SKIP] file:a.wt; stable page walk skipped ref=0x48"),
        rts(
            "[ONDISK_ABORT_TW] file:a.wt; on-disk update aborted with time_window=(5, 10)/(5, 10)/12. \
             Start durable_timestamp > stable_timestamp: true, or txnid_not_visible=false, \
             or tw_has_no_stop_and_is_prepared=false",
        ),
        rts("[ONDISK_KEY_ROLLBACK] file:a.wt; on-disk key rolled back key=17"),
        rts(
            "[KEY_CLEAR_REMOVE] file:a.wt; key restored with commit_timestamp=(3, 0), \
             durable_timestamp=(3, 0), stable_timestamp=(5, 9), txnid=9 and removed \
             commit_timestamp=(5, 10), durable_timestamp=(5, 10), txnid=12, prepared=false",
        ),
        rts("[HS_TREE_SKIP] file:WiredTigerHS.wt; durable_timestamp=(4, 0), stable_timestamp=(5, 9)"),
    ];
    let summary = verify_lines(&lines).unwrap();
    assert_eq!(summary.checks.trees, 3);
    assert_eq!(summary.checks.trees_rolled_back, 1);
    assert_eq!(summary.checks.trees_skipped, 2);
    assert_eq!(summary.checks.records.get(&RecordCategory::RecoverCkpt), Some(&1));
}

#[test]
fn test_recovery_stable_disagreeing_with_init_fails() {
    let lines = vec![
        rts("[RECOVERY_RTS] stable_timestamp=(6, 0) and oldest_timestamp=(1, 0)"),
        init("(5, 9)"),
    ];
    let err = verify_lines(&lines).unwrap_err();
    assert!(matches!(
        reason(&err),
        RecordError::Check(CheckError::StableMismatch { category: "RECOVERY_RTS", .. })
    ));
    let Error::Rejected { line_no, .. } = err else {
        unreachable!()
    };
    assert_eq!(line_no, 2);
}

#[test]
fn test_invalid_utf8_line_reports_line_number() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rts.log");
    let mut bytes = init("(5, 9)").into_bytes();
    bytes.extend_from_slice(b"\n[1700000000:000002][4242:0x7f5c] WT_VERB_RECOVERY: \xc3\x28\n");
    bytes.extend_from_slice(rts("[FILE_SKIP] file:a").as_bytes());
    bytes.extend_from_slice(b"\xff\n");
    std::fs::write(&path, &bytes).unwrap();

    let err = verify_file(&VerifierConfig::default(), &path).unwrap_err();
    let Error::Rejected { line_no, .. } = &err else {
        panic!("expected a rejected line, got: {err}");
    };
    assert_eq!(*line_no, 3);
    assert!(matches!(reason(&err), RecordError::Parse(ParseError::InvalidUtf8)));
}
