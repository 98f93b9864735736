//! Positional placeholder translation.
//!
//! Queries are written once with `?` markers and rewritten into the target
//! engine's native positional syntax right before execution. Bound values are
//! never touched; they travel next to the query in the same order.
//!
//! This is a text transform, not a SQL parser. The scanner below only knows
//! enough to step over `'...'` literals, `"..."` identifiers, `--` line comments
//! and `/* */` block comments, so a `?` inside any of those stays as written.
//! Postgres dollar-quoted bodies (`$$ ... $$`), `E'...'` backslash escapes and the
//! jsonb `?` operators are NOT recognised; a marker there is still rewritten.

use std::borrow::Cow;
use std::fmt::Write;
use std::ops::Range;

/// The engine-agnostic marker used by every query in the application.
pub const MARKER: char = '?';

/// Native positional parameter syntax of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (SQLite). Identical to the marker, so translation is a no-op.
    Question,
    /// `$1`, `$2`, ... (PostgreSQL).
    Dollar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    Code,
    Literal,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segment {
    pub kind: SegmentKind,
    pub range: Range<usize>,
}

/// Split `query` into code, quoted and comment regions, in source order.
///
/// All delimiters are ASCII, so byte offsets always land on char boundaries.
pub(crate) fn segments(query: &str) -> Vec<Segment> {
    let bytes = query.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let region = match bytes[i] {
            quote @ (b'\'' | b'"') => Some((SegmentKind::Literal, end_of_quoted(bytes, i, quote))),
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                Some((SegmentKind::Comment, end_of_line_comment(bytes, i)))
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                Some((SegmentKind::Comment, end_of_block_comment(bytes, i)))
            }
            _ => None,
        };

        match region {
            Some((kind, end)) => {
                if start < i {
                    out.push(Segment {
                        kind: SegmentKind::Code,
                        range: start..i,
                    });
                }
                out.push(Segment { kind, range: i..end });
                i = end;
                start = end;
            }
            None => i += 1,
        }
    }

    if start < bytes.len() {
        out.push(Segment {
            kind: SegmentKind::Code,
            range: start..bytes.len(),
        });
    }
    out
}

fn end_of_quoted(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn end_of_line_comment(bytes: &[u8], open: usize) -> usize {
    bytes[open..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |p| open + p)
}

fn end_of_block_comment(bytes: &[u8], open: usize) -> usize {
    bytes[open + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| open + 2 + p + 2)
}

/// Byte offsets of every marker outside quoted regions and comments.
fn marker_positions(query: &str) -> Vec<usize> {
    segments(query)
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Code)
        .flat_map(|s| {
            let base = s.range.start;
            query[s.range]
                .match_indices(MARKER)
                .map(move |(offset, _)| base + offset)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Number of markers the translator will rewrite.
pub fn placeholder_count(query: &str) -> usize {
    marker_positions(query).len()
}

/// Rewrite `query` into `style`.
///
/// The Nth marker becomes the Nth native token, numbered from 1. Every other
/// byte is copied through. Returns the input borrowed when nothing changes.
pub fn translate(query: &str, style: PlaceholderStyle) -> Cow<'_, str> {
    match style {
        PlaceholderStyle::Question => Cow::Borrowed(query),
        PlaceholderStyle::Dollar => {
            let positions = marker_positions(query);
            if positions.is_empty() {
                return Cow::Borrowed(query);
            }

            let mut out = String::with_capacity(query.len() + positions.len() * 2);
            let mut last = 0;
            for (n, pos) in positions.into_iter().enumerate() {
                out.push_str(&query[last..pos]);
                // writing into a String cannot fail
                let _ = write!(out, "${}", n + 1);
                last = pos + MARKER.len_utf8();
            }
            out.push_str(&query[last..]);
            Cow::Owned(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_numbers_markers_in_order() {
        let q = "SELECT * FROM medicines WHERE id = ? AND user_id = ?";
        assert_eq!(
            translate(q, PlaceholderStyle::Dollar),
            "SELECT * FROM medicines WHERE id = $1 AND user_id = $2"
        );
    }

    #[test]
    fn many_markers_count_up_without_reuse() {
        let q = "INSERT INTO t VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let out = translate(q, PlaceholderStyle::Dollar);
        assert_eq!(
            out,
            "INSERT INTO t VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        assert_eq!(placeholder_count(q), 11);
    }

    #[test]
    fn zero_markers_is_borrowed_passthrough() {
        let q = "CREATE TABLE IF NOT EXISTS users (id BIGSERIAL PRIMARY KEY)";
        let out = translate(q, PlaceholderStyle::Dollar);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert_eq!(out, q);
    }

    #[test]
    fn question_style_is_identity() {
        let q = "UPDATE medicines SET name = ? WHERE id = ?";
        assert!(matches!(
            translate(q, PlaceholderStyle::Question),
            Cow::Borrowed(s) if s == q
        ));
    }

    #[test]
    fn translation_is_deterministic() {
        let q = "DELETE FROM medicines WHERE id = ? AND user_id = ?";
        let a = translate(q, PlaceholderStyle::Dollar).into_owned();
        let b = translate(q, PlaceholderStyle::Dollar).into_owned();
        assert_eq!(a, b);
    }

    #[test]
    fn markers_inside_literals_and_comments_are_kept() {
        let q = "SELECT '?', \"we?rd\" FROM t -- why?\nWHERE a = ? /* or ? */ AND b = ?";
        assert_eq!(
            translate(q, PlaceholderStyle::Dollar),
            "SELECT '?', \"we?rd\" FROM t -- why?\nWHERE a = $1 /* or ? */ AND b = $2"
        );
    }

    #[test]
    fn escaped_quote_does_not_end_literal() {
        let q = "SELECT 'it''s ?' WHERE x = ?";
        assert_eq!(
            translate(q, PlaceholderStyle::Dollar),
            "SELECT 'it''s ?' WHERE x = $1"
        );
    }

    #[test]
    fn non_ascii_text_is_preserved() {
        let q = "SELECT * FROM medicines WHERE name = ? AND dose = 'ñ?' AND frequency = ?";
        assert_eq!(
            translate(q, PlaceholderStyle::Dollar),
            "SELECT * FROM medicines WHERE name = $1 AND dose = 'ñ?' AND frequency = $2"
        );
    }

    #[test]
    fn unterminated_literal_swallows_rest() {
        let q = "SELECT ? WHERE x = 'oops ?";
        assert_eq!(
            translate(q, PlaceholderStyle::Dollar),
            "SELECT $1 WHERE x = 'oops ?"
        );
    }

    #[test]
    fn segments_cover_whole_query() {
        let q = "a '' b -- c\n/* d */e";
        let segs = segments(q);
        let joined: String = segs.iter().map(|s| &q[s.range.clone()]).collect();
        assert_eq!(joined, q);
        assert_eq!(
            segs.iter().map(|s| s.kind).collect::<Vec<_>>(),
            vec![
                SegmentKind::Code,
                SegmentKind::Literal,
                SegmentKind::Code,
                SegmentKind::Comment,
                SegmentKind::Code,
                SegmentKind::Comment,
                SegmentKind::Code,
            ]
        );
    }
}
