//! Tokenizer and typed field extraction for trace line bodies.
//!
//! A body is split into words (`[A-Za-z0-9_.]+`, minus trailing dots) and
//! single punctuation characters. Fields are then located by shape rather
//! than by pattern matching over raw text:
//!
//! - `key=value`, where a key may itself be compound
//!   (`start_durable/commit_timestamp=...`)
//! - `lhs=value OP rhs=value: flag`, where `flag` is the engine's own
//!   evaluation of `lhs OP rhs`
//! - `label: flag`, for verdicts logged without operands
//! - `file:NAME`, looked up in the body first and then in the message prefix
//!
//! A key occurring twice in one body is rejected instead of picking one of
//! the occurrences.

use crate::error::ParseError;
use crate::types::{PrepareState, TimeWindow, Timestamp, UpdateDisposition};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Word(&'a str),
    Punct(char),
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "'{w}'"),
            Token::Punct(c) => write!(f, "'{c}'"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

pub(crate) fn tokenize(body: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = body.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if !is_word_char(c) {
            tokens.push(Token::Punct(c));
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if !is_word_char(next) {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        // A sentence-ending dot is punctuation, not part of the value.
        let word = &body[start..end];
        let trimmed = word.trim_end_matches('.');
        if !trimmed.is_empty() {
            tokens.push(Token::Word(trimmed));
        }
        tokens.extend(std::iter::repeat_n(Token::Punct('.'), word.len() - trimmed.len()));
    }

    tokens
}

/// Read position inside one field's value.
pub(crate) struct Cursor<'t, 'a> {
    tokens: &'t [Token<'a>],
    pos: usize,
    category: &'static str,
    field: &'static str,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn malformed(&self, expected: &'static str, found: Option<Token<'a>>) -> ParseError {
        ParseError::MalformedField {
            category: self.category,
            field: self.field,
            expected,
            found: found.map_or_else(|| "end of line".to_string(), |t| t.to_string()),
        }
    }

    pub(crate) fn punct(&mut self, c: char, expected: &'static str) -> Result<(), ParseError> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            other => Err(self.malformed(expected, other)),
        }
    }

    pub(crate) fn word(&mut self, expected: &'static str) -> Result<&'a str, ParseError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(self.malformed(expected, other)),
        }
    }

    pub(crate) fn keyword(&mut self, keyword: &str, expected: &'static str) -> Result<(), ParseError> {
        match self.next() {
            Some(Token::Word(w)) if w == keyword => Ok(()),
            other => Err(self.malformed(expected, other)),
        }
    }

    fn unknown_label(&self, label: &str) -> ParseError {
        ParseError::UnknownLabel {
            category: self.category,
            field: self.field,
            label: label.to_string(),
        }
    }
}

/// A value that can be read from a field position.
pub(crate) trait FieldValue: Sized {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError>;
}

const DECIMAL: &str = "a decimal integer";

impl FieldValue for u64 {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        let word = cursor.word(DECIMAL)?;
        word.parse()
            .map_err(|_| cursor.malformed(DECIMAL, Some(Token::Word(word))))
    }
}

impl FieldValue for bool {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        const EXPECTED: &str = "true or false";
        let word = cursor.word(EXPECTED)?;
        if word.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if word.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(cursor.malformed(EXPECTED, Some(Token::Word(word))))
        }
    }
}

impl FieldValue for Timestamp {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        const EXPECTED: &str = "a timestamp (start, stop)";
        cursor.punct('(', EXPECTED)?;
        let start = u64::read(cursor)?;
        cursor.punct(',', EXPECTED)?;
        let stop = u64::read(cursor)?;
        cursor.punct(')', EXPECTED)?;
        Ok(Timestamp::new(start, stop))
    }
}

/// `TS/TS/TXN`, the building block of time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimePoint {
    pub first: Timestamp,
    pub second: Timestamp,
    pub txn: u64,
}

impl FieldValue for TimePoint {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        const EXPECTED: &str = "a time point TS/TS/TXN";
        let first = Timestamp::read(cursor)?;
        cursor.punct('/', EXPECTED)?;
        let second = Timestamp::read(cursor)?;
        cursor.punct('/', EXPECTED)?;
        let txn = u64::read(cursor)?;
        Ok(TimePoint { first, second, txn })
    }
}

impl FieldValue for TimeWindow {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        const EXPECTED: &str = "a time window start: TS/TS/TXN stop: TS/TS/TXN";
        cursor.keyword("start", EXPECTED)?;
        cursor.punct(':', EXPECTED)?;
        let start = TimePoint::read(cursor)?;
        cursor.keyword("stop", EXPECTED)?;
        cursor.punct(':', EXPECTED)?;
        let stop = TimePoint::read(cursor)?;
        Ok(TimeWindow {
            durable_start: start.first,
            start: start.second,
            start_txn: start.txn,
            durable_stop: stop.first,
            stop: stop.second,
            stop_txn: stop.txn,
        })
    }
}

/// Two values separated by a comma, as in `(1, 2), (3, 4)`.
impl<A: FieldValue, B: FieldValue> FieldValue for (A, B) {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        let a = A::read(cursor)?;
        cursor.punct(',', "two comma-separated values")?;
        let b = B::read(cursor)?;
        Ok((a, b))
    }
}

impl FieldValue for PrepareState {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        let word = cursor.word("a prepare state label")?;
        PrepareState::from_label(word).ok_or_else(|| cursor.unknown_label(word))
    }
}

impl FieldValue for UpdateDisposition {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        let word = cursor.word("an update type label")?;
        UpdateDisposition::from_label(word).ok_or_else(|| cursor.unknown_label(word))
    }
}

/// A page address written as `0x...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Address(pub u64);

impl FieldValue for Address {
    fn read(cursor: &mut Cursor<'_, '_>) -> Result<Self, ParseError> {
        const EXPECTED: &str = "a hex address 0x...";
        let word = cursor.word(EXPECTED)?;
        word.strip_prefix("0x")
            .and_then(|digits| u64::from_str_radix(digits, 16).ok())
            .map(Address)
            .ok_or_else(|| cursor.malformed(EXPECTED, Some(Token::Word(word))))
    }
}

/// A relational clause together with the engine's verdict on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Relation<T> {
    pub lhs: T,
    pub rhs: T,
    pub reported: bool,
}

/// Tokenized body of one trace line, plus the message prefix before the
/// category marker.
#[derive(Debug, Clone)]
pub(crate) struct Fields<'a> {
    category: &'static str,
    tokens: Vec<Token<'a>>,
    prefix: Vec<Token<'a>>,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(category: &'static str, prefix: &'a str, body: &'a str) -> Self {
        Self {
            category,
            tokens: tokenize(body),
            prefix: tokenize(prefix),
        }
    }

    /// Position just past `key<sep>` in `tokens`, if the key occurs exactly
    /// once.
    fn locate_in(
        &self,
        tokens: &[Token<'a>],
        key: &'static str,
        sep: char,
    ) -> Result<Option<usize>, ParseError> {
        let mut pattern = tokenize(key);
        pattern.push(Token::Punct(sep));

        let mut hits = tokens
            .windows(pattern.len())
            .enumerate()
            .filter_map(|(i, window)| (window == pattern.as_slice()).then_some(i + pattern.len()));

        let first = hits.next();
        if hits.next().is_some() {
            return Err(ParseError::DuplicateField {
                category: self.category,
                field: key,
            });
        }
        Ok(first)
    }

    fn cursor_in<'f>(
        &'f self,
        tokens: &'f [Token<'a>],
        key: &'static str,
        sep: char,
    ) -> Result<Cursor<'f, 'a>, ParseError> {
        let pos = self.locate_in(tokens, key, sep)?.ok_or(ParseError::MissingField {
            category: self.category,
            field: key,
        })?;
        Ok(Cursor {
            tokens,
            pos,
            category: self.category,
            field: key,
        })
    }

    /// Value of a required `key=value` field.
    pub(crate) fn get<T: FieldValue>(&self, key: &'static str) -> Result<T, ParseError> {
        let mut cursor = self.cursor_in(&self.tokens, key, '=')?;
        T::read(&mut cursor)
    }

    /// Verdict of a required `label: flag` field.
    pub(crate) fn flag(&self, label: &'static str) -> Result<bool, ParseError> {
        let mut cursor = self.cursor_in(&self.tokens, label, ':')?;
        bool::read(&mut cursor)
    }

    /// Value of `lhs=value OP rhs=value: flag`.
    pub(crate) fn relation<T: FieldValue>(
        &self,
        lhs: &'static str,
        op: char,
        rhs: &'static str,
    ) -> Result<Relation<T>, ParseError> {
        const EXPECTED: &str = "a relation LHS OP RHS: FLAG";
        let mut cursor = self.cursor_in(&self.tokens, lhs, '=')?;
        let lhs_value = T::read(&mut cursor)?;
        cursor.punct(op, EXPECTED)?;
        cursor.keyword(rhs, EXPECTED)?;
        cursor.punct('=', EXPECTED)?;
        cursor.field = rhs;
        let rhs_value = T::read(&mut cursor)?;
        cursor.punct(':', EXPECTED)?;
        let reported = bool::read(&mut cursor)?;
        Ok(Relation {
            lhs: lhs_value,
            rhs: rhs_value,
            reported,
        })
    }

    /// Split the body at the first occurrence of the word `at`, for messages
    /// that repeat the same keys for two different things.
    pub(crate) fn split(&self, at: &'static str) -> Result<(Self, Self), ParseError> {
        let pos = self
            .tokens
            .iter()
            .position(|t| *t == Token::Word(at))
            .ok_or(ParseError::MissingField {
                category: self.category,
                field: at,
            })?;
        let part = |tokens: &[Token<'a>]| Self {
            category: self.category,
            tokens: tokens.to_vec(),
            prefix: self.prefix.clone(),
        };
        Ok((part(&self.tokens[..pos]), part(&self.tokens[pos + 1..])))
    }

    /// Tree file name from `file:NAME`, if present in the body or the
    /// message prefix.
    pub(crate) fn file_opt(&self) -> Result<Option<String>, ParseError> {
        for tokens in [&self.tokens, &self.prefix] {
            if self.locate_in(tokens, "file", ':')?.is_some() {
                let mut cursor = self.cursor_in(tokens, "file", ':')?;
                return cursor.word("a file name").map(|w| Some(w.to_string()));
            }
        }
        Ok(None)
    }

    /// Tree file name from a required `file:NAME`.
    pub(crate) fn file(&self) -> Result<String, ParseError> {
        self.file_opt()?.ok_or(ParseError::MissingField {
            category: self.category,
            field: "file",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_words_and_punctuation() {
        let tokens = tokenize("file:a.wt; ts=(5, 10)");
        assert_eq!(
            tokens,
            vec![
                Token::Word("file"),
                Token::Punct(':'),
                Token::Word("a.wt"),
                Token::Punct(';'),
                Token::Word("ts"),
                Token::Punct('='),
                Token::Punct('('),
                Token::Word("5"),
                Token::Punct(','),
                Token::Word("10"),
                Token::Punct(')'),
            ]
        );
    }

    #[test]
    fn get_reads_typed_values() {
        let fields = Fields::new("T", "", "n=42, flag=TRUE, ts=(7, 100), addr=0x7fab, state=WT_PREPARE_LOCKED");
        assert_eq!(fields.get::<u64>("n").unwrap(), 42);
        assert!(fields.get::<bool>("flag").unwrap());
        assert_eq!(fields.get::<Timestamp>("ts").unwrap(), Timestamp::new(7, 100));
        assert_eq!(fields.get::<Address>("addr").unwrap(), Address(0x7fab));
        assert_eq!(fields.get::<PrepareState>("state").unwrap(), PrepareState::Locked);
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let fields = Fields::new("TREE", "", "modified=true");
        let err = fields.get::<u64>("txnid").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingField {
                category: "TREE",
                field: "txnid"
            }
        );
    }

    #[test]
    fn key_must_be_a_whole_word() {
        let fields = Fields::new("T", "", "has_prepared_updates=false");
        assert!(fields.get::<bool>("prepared_updates").is_err());
        assert!(!fields.get::<bool>("has_prepared_updates").unwrap());
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let fields = Fields::new("T", "", "txnid=1 txnid=2");
        assert!(matches!(
            fields.get::<u64>("txnid"),
            Err(ParseError::DuplicateField { field: "txnid", .. })
        ));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let fields = Fields::new("T", "", "n=abc, flag=yes, ts=(1 2), addr=7fab");
        assert!(matches!(fields.get::<u64>("n"), Err(ParseError::MalformedField { .. })));
        assert!(matches!(fields.get::<bool>("flag"), Err(ParseError::MalformedField { .. })));
        assert!(matches!(fields.get::<Timestamp>("ts"), Err(ParseError::MalformedField { .. })));
        assert!(matches!(fields.get::<Address>("addr"), Err(ParseError::MalformedField { .. })));
    }

    #[test]
    fn truncated_timestamp_reports_end_of_line() {
        let fields = Fields::new("INIT", "", "stable_timestamp=(7, 100");
        let err = fields.get::<Timestamp>("stable_timestamp").unwrap_err();
        assert!(err.to_string().contains("end of line"), "{err}");
    }

    #[test]
    fn unknown_label_is_rejected() {
        let fields = Fields::new("T", "", "type=WT_UPDATE_BOGUS");
        assert!(matches!(
            fields.get::<UpdateDisposition>("type"),
            Err(ParseError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn relation_reads_both_sides_and_flag() {
        let fields = Fields::new("TREE", "", "durable_timestamp=(5, 10) > stable_timestamp=(5, 9): true");
        let rel: Relation<Timestamp> = fields
            .relation("durable_timestamp", '>', "stable_timestamp")
            .unwrap();
        assert_eq!(rel.lhs, Timestamp::new(5, 10));
        assert_eq!(rel.rhs, Timestamp::new(5, 9));
        assert!(rel.reported);
    }

    #[test]
    fn relation_with_wrong_operator_is_malformed() {
        let fields = Fields::new("TREE", "", "txnid=3 < recovery_checkpoint_snap_min=5: false");
        let rel = fields.relation::<u64>("txnid", '>', "recovery_checkpoint_snap_min");
        assert!(matches!(rel, Err(ParseError::MalformedField { field: "txnid", .. })));
    }

    #[test]
    fn time_window_is_read_in_order() {
        let fields = Fields::new(
            "HS_UPDATE_VALID",
            "",
            "time_window=start: (10, 1)/(9, 2)/33 stop: (20, 3)/(19, 4)/44, type=WT_UPDATE_STANDARD",
        );
        let tw: TimeWindow = fields.get("time_window").unwrap();
        assert_eq!(tw.durable_start, Timestamp::new(10, 1));
        assert_eq!(tw.start, Timestamp::new(9, 2));
        assert_eq!(tw.start_txn, 33);
        assert_eq!(tw.durable_stop, Timestamp::new(20, 3));
        assert_eq!(tw.stop, Timestamp::new(19, 4));
        assert_eq!(tw.stop_txn, 44);
    }

    #[test]
    fn file_name_is_optional_or_required() {
        let with = Fields::new("TREE", "", "file:test_1.wt; modified=true");
        assert_eq!(with.file_opt().unwrap().as_deref(), Some("test_1.wt"));
        assert_eq!(with.file().unwrap(), "test_1.wt");

        let without = Fields::new("TREE", "", "modified=true");
        assert_eq!(without.file_opt().unwrap(), None);
        assert!(without.file().is_err());
    }

    #[test]
    fn trailing_dot_ends_a_value() {
        let fields = Fields::new("T", "", "rolled back txnid=12. file:a.wt.");
        assert_eq!(fields.get::<u64>("txnid").unwrap(), 12);
        assert_eq!(fields.file().unwrap(), "a.wt");
        assert_eq!(tokenize("..."), vec![Token::Punct('.'); 3]);
    }

    #[test]
    fn file_falls_back_to_the_message_prefix() {
        let fields = Fields::new(
            "PAGE_ROLLBACK",
            "[1700000000:1][42:0x7f], file:a.wt, WT_SESSION.rollback_to_stable: [WT_VERB_RTS][DEBUG_1]: ",
            " rolling back page addr=0x10 modified=true",
        );
        assert_eq!(fields.file().unwrap(), "a.wt");

        // The body wins over the prefix.
        let fields = Fields::new("TREE", "file:prefix.wt, ", " file:body.wt; modified=true");
        assert_eq!(fields.file_opt().unwrap().as_deref(), Some("body.wt"));
    }

    #[test]
    fn compound_keys_and_pairs() {
        let fields = Fields::new(
            "HS_ABORT_STOP",
            "",
            "start_durable/commit_timestamp=(1, 2), (3, 4), stop_durable/commit_timestamp=(5, 6), (7, 8)",
        );
        let (durable, commit): (Timestamp, Timestamp) =
            fields.get("start_durable/commit_timestamp").unwrap();
        assert_eq!(durable, Timestamp::new(1, 2));
        assert_eq!(commit, Timestamp::new(3, 4));
        let (durable, _): (Timestamp, Timestamp) =
            fields.get("stop_durable/commit_timestamp").unwrap();
        assert_eq!(durable, Timestamp::new(5, 6));
        assert!(matches!(
            fields.get::<(Timestamp, Timestamp)>("commit_timestamp"),
            Err(ParseError::DuplicateField { .. })
        ));
    }

    #[test]
    fn flag_reads_a_bare_verdict() {
        let fields = Fields::new("ONDISK_ABORT_TW", "", "durable_timestamp > stable_timestamp: true, txnid_not_visible=false");
        assert!(fields.flag("durable_timestamp > stable_timestamp").unwrap());
        assert!(!fields.get::<bool>("txnid_not_visible").unwrap());
    }

    #[test]
    fn split_separates_repeated_keys() {
        let fields = Fields::new("KEY_CLEAR_REMOVE", "", "restored txnid=1 and removed txnid=2");
        assert!(fields.get::<u64>("txnid").is_err());
        let (restored, removed) = fields.split("removed").unwrap();
        assert_eq!(restored.get::<u64>("txnid").unwrap(), 1);
        assert_eq!(removed.get::<u64>("txnid").unwrap(), 2);
        assert!(fields.split("missing").is_err());
    }
}
