//! Insert-identity emulation.
//!
//! SQLite reports the rowid of the last insert on every execution; Postgres only
//! hands it back when the statement asks for it with `RETURNING`. SQLite's rowid
//! is also wrong for an upsert whose update branch fired, so those ask too. [`plan_run`]
//! decides, per statement, how the identifier will be obtained so that callers
//! always read it from [`RunResult::last_id`](super::RunResult).

use std::borrow::Cow;

use serde_json::Value;

use super::Row;
use super::placeholder::{SegmentKind, segments};

/// Surrogate key column every insertable table is assumed to have.
///
/// A caller-written `RETURNING` list must name it (or use `*`) for the
/// identifier to be read; [`plan_run`] appends it when missing.
pub const IDENTITY_COLUMN: &str = "id";

/// How a `run` statement is to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan<'q> {
    pub sql: Cow<'q, str>,
    pub is_insert: bool,
    /// The statement yields rows that carry the identifier.
    pub returns_rows: bool,
}

/// First keyword of the statement, skipping whitespace and comments.
pub fn leading_keyword(query: &str) -> Option<&str> {
    segments(query)
        .into_iter()
        .filter(|s| s.kind != SegmentKind::Comment)
        .find_map(|s| {
            let text = query[s.range].trim_start();
            (!text.is_empty()).then_some(text)
        })
        .map(|text| {
            let end = text
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(text.len());
            &text[..end]
        })
        .filter(|word| !word.is_empty())
}

pub fn is_insert(query: &str) -> bool {
    leading_keyword(query).is_some_and(|k| k.eq_ignore_ascii_case("insert"))
}

/// Words (`[A-Za-z0-9_]+`) outside quotes and comments, with their byte offsets.
fn code_words(query: &str) -> Vec<(usize, &str)> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut words = Vec::new();
    for seg in segments(query)
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Code)
    {
        let text = &query[seg.range.clone()];
        let mut start = None;
        for (i, c) in text.char_indices() {
            match (is_word(c), start) {
                (true, None) => start = Some(i),
                (false, Some(st)) => {
                    words.push((seg.range.start + st, &text[st..i]));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(st) = start {
            words.push((seg.range.start + st, &text[st..]));
        }
    }
    words
}

/// Whether a `RETURNING` clause is already present outside quotes and comments.
pub fn has_returning(query: &str) -> bool {
    returning_end(query).is_some()
}

/// Byte offset just past the last `RETURNING` keyword.
fn returning_end(query: &str) -> Option<usize> {
    code_words(query)
        .into_iter()
        .rev()
        .find(|(_, w)| w.eq_ignore_ascii_case("returning"))
        .map(|(offset, w)| offset + w.len())
}

/// Whether the `RETURNING` list starting at `from` yields the identity column,
/// by name (possibly qualified) or through `*`.
fn returns_identity(query: &str, from: usize) -> bool {
    let by_name = code_words(query)
        .into_iter()
        .any(|(offset, w)| offset >= from && w.eq_ignore_ascii_case(IDENTITY_COLUMN));
    let by_star = segments(query)
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Code && s.range.end > from)
        .any(|s| {
            let lo = s.range.start.max(from);
            query[lo..s.range.end].contains('*')
        });
    by_name || by_star
}

/// `ON CONFLICT ...` or `INSERT OR <action>`: the affected row may not be a
/// freshly inserted one, so a connection-wide "last inserted rowid" can't be trusted.
pub fn has_conflict_clause(query: &str) -> bool {
    let words = code_words(query);
    let on_conflict = words
        .windows(2)
        .any(|w| w[0].1.eq_ignore_ascii_case("on") && w[1].1.eq_ignore_ascii_case("conflict"));
    let insert_or = matches!(
        words.as_slice(),
        [(_, first), (_, second), ..]
            if first.eq_ignore_ascii_case("insert") && second.eq_ignore_ascii_case("or")
    );
    on_conflict || insert_or
}

/// Insert `clause` after the last statement token, ahead of any trailing
/// `;`, whitespace or comment.
fn append_clause(query: &str, clause: &str) -> String {
    let end = segments(query)
        .into_iter()
        .rev()
        .filter(|s| s.kind != SegmentKind::Comment)
        .find_map(|s| {
            let text = &query[s.range.clone()];
            let kept = match s.kind {
                SegmentKind::Code => text.trim_end_matches(|c: char| c.is_whitespace() || c == ';'),
                _ => text,
            };
            (!kept.is_empty()).then_some(s.range.start + kept.len())
        })
        .unwrap_or(query.len());

    format!("{}{}{}", &query[..end], clause, &query[end..])
}

/// Decide how to execute an already translated `run` statement.
///
/// `native_identity` is true for engines that report the last inserted rowid
/// without being asked. That rowid is only used for plain inserts; upserts and
/// `INSERT OR ...` go through `RETURNING` like on every other engine.
///
/// A caller-written `RETURNING` list that lacks the identity column gets it
/// appended, so `last_id` is filled whenever a single row comes back.
pub fn plan_run(query: &str, native_identity: bool) -> RunPlan<'_> {
    if !is_insert(query) {
        return RunPlan {
            sql: Cow::Borrowed(query),
            is_insert: false,
            returns_rows: false,
        };
    }

    let sql = match returning_end(query) {
        Some(end) if returns_identity(query, end) => Cow::Borrowed(query),
        Some(_) => Cow::Owned(append_clause(query, &format!(", {IDENTITY_COLUMN}"))),
        None if native_identity && !has_conflict_clause(query) => {
            return RunPlan {
                sql: Cow::Borrowed(query),
                is_insert: true,
                returns_rows: false,
            };
        }
        None => Cow::Owned(append_clause(
            query,
            &format!(" RETURNING {IDENTITY_COLUMN}"),
        )),
    };

    RunPlan {
        sql,
        is_insert: true,
        returns_rows: true,
    }
}

/// Identifier from rows produced by an insert with `RETURNING`.
///
/// Only a single inserted row yields an identifier.
pub fn identity_from_rows(rows: &[Row]) -> Option<i64> {
    match rows {
        [row] => row.get(IDENTITY_COLUMN).and_then(Value::as_i64),
        _ => None,
    }
}

/// Identifier reported natively by the engine.
pub fn identity_from_native(is_insert: bool, rows_affected: u64, rowid: i64) -> Option<i64> {
    (is_insert && rows_affected == 1).then_some(rowid)
}
