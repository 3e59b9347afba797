//! Pipe-delimited latency-trace line parser.
//!
//! One line, nine `|`-delimited fields:
//! `cursorState|subTime|pubTime|threadId|namespace|messageId|payload|pubHost|subHost`
//!
//! Two producer dialects wrote these lines and they disagree on how the
//! debug-log prefix leaks into the cursor-state field; see [`Dialect`].

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Number of `|`-delimited fields in a well-formed line.
const FIELD_COUNT: usize = 9;

/// Debug-log prefix marker that leaks into the cursor-state field.
const DEBUG_PREFIX: &str = "DEBUG:root:";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One normalized observation extracted from a log line.
///
/// Immutable after construction; carries no identity beyond its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub pub_ts: DateTime<Utc>,
    pub sub_ts: DateTime<Utc>,
    /// Character length of the raw payload field, not a decoded byte count.
    pub payload_size: u64,
    /// `cursorState|threadId|namespace|messageId` — uniqueness proxy downstream.
    pub comment: String,
    pub pub_host: String,
    pub sub_host: String,
}

impl TraceRecord {
    /// Shared column list for the destination table, in bind order.
    pub fn columns() -> &'static [&'static str] {
        &[
            "pub_ts",
            "sub_ts",
            "pub_us",
            "sub_us",
            "payload_size",
            "comment",
            "pub_host",
            "sub_host",
        ]
    }
}

/// Which producer wrote a line.
///
/// `B` producers embed `"go"` somewhere in the line; the detection is a
/// substring match over the *whole* line, not just the cursor-state field.
/// Fragile, but it is the rule the data was written under — keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    A,
    B,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed line: expected 9 fields, got {fields}")]
    MalformedLine { fields: usize },
    #[error("unparseable {field} timestamp: {value:?}")]
    Timestamp { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Pure dialect predicate over the raw line.
pub fn detect_dialect(line: &str) -> Dialect {
    if line.contains("go") {
        Dialect::B
    } else {
        Dialect::A
    }
}

/// Parse one raw log line into a [`TraceRecord`].
///
/// Pure: no I/O, no state. Field extraction is independent of dialect
/// detection so the detection rule can be swapped without touching it.
pub fn parse_line(line: &str) -> Result<TraceRecord, ParseError> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != FIELD_COUNT {
        return Err(ParseError::MalformedLine {
            fields: fields.len(),
        });
    }

    let (cursor_state, sub_time, pub_time, thread_id, namespace, message_id, payload, pub_host, sub_host) = (
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7],
        fields[8],
    );

    let cursor_state = strip_cursor_state(cursor_state, detect_dialect(line));

    // Trailing quoted-string artifact: keep only the part before the first '"'.
    let sub_host = sub_host.split('"').next().unwrap_or("");

    let pub_ts = parse_instant(pub_time).ok_or_else(|| ParseError::Timestamp {
        field: "pub",
        value: pub_time.to_string(),
    })?;
    let sub_ts = parse_instant(sub_time).ok_or_else(|| ParseError::Timestamp {
        field: "sub",
        value: sub_time.to_string(),
    })?;

    Ok(TraceRecord {
        pub_ts,
        sub_ts,
        payload_size: payload.chars().count() as u64,
        comment: format!("{}|{}|{}|{}", cursor_state, thread_id, namespace, message_id),
        pub_host: pub_host.to_string(),
        sub_host: sub_host.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Strip the debug-log prefix from the cursor-state field per dialect.
///
/// Dialect A removes every occurrence of the marker; dialect B keeps only
/// the suffix after the last occurrence.
fn strip_cursor_state(raw: &str, dialect: Dialect) -> String {
    match dialect {
        Dialect::A => raw.replace(DEBUG_PREFIX, ""),
        Dialect::B => raw.rsplit(DEBUG_PREFIX).next().unwrap_or(raw).to_string(),
    }
}

/// Permissive ISO-8601 parse: RFC3339 first, then naive `T`- or
/// space-separated datetimes (assumed UTC).
fn parse_instant(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some(naive.and_utc());
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn make_line(cursor: &str, sub_host: &str) -> String {
        format!(
            "{}|2026-01-05T10:00:01.500000+00:00|2026-01-05T10:00:01.000000+00:00|t-1|ns/default|msg-42|xxxxxxxxxx|pub-host-a|{}",
            cursor, sub_host
        )
    }

    #[test]
    fn test_parse_dialect_a() {
        // No "go" anywhere — dialect A strips every prefix occurrence
        let line = make_line("DEBUG:root:cursor-ok", "sub-host-b\" extra");
        assert_eq!(detect_dialect(&line), Dialect::A);

        let rec = parse_line(&line).unwrap();
        assert_eq!(rec.comment, "cursor-ok|t-1|ns/default|msg-42");
        assert_eq!(rec.sub_host, "sub-host-b");
        assert_eq!(rec.payload_size, 10);
        assert_eq!(rec.pub_host, "pub-host-a");
        assert!(rec.sub_ts > rec.pub_ts);
    }

    #[test]
    fn test_parse_dialect_b() {
        // "go" in the namespace is enough to flip the whole line to dialect B
        let line =
            "DEBUG:root:pre DEBUG:root:cursor-1|2026-01-05T10:00:01Z|2026-01-05T10:00:00Z|t-2|ns/go-bench|msg-7|xx|ph|sh";
        assert_eq!(detect_dialect(line), Dialect::B);

        let rec = parse_line(line).unwrap();
        // Dialect B keeps only the suffix after the last marker
        assert_eq!(rec.comment, "cursor-1|t-2|ns/go-bench|msg-7");
    }

    #[test]
    fn test_dialect_detection_is_whole_line() {
        // "go" appears only in the payload field, not cursor-state —
        // the rule still selects dialect B
        let line = "DEBUG:root:c|2026-01-05T10:00:01Z|2026-01-05T10:00:00Z|t|ns|m|golang|ph|sh";
        assert_eq!(detect_dialect(line), Dialect::B);
    }

    #[test]
    fn test_wrong_field_count() {
        let err = parse_line("a|b|c").unwrap_err();
        match err {
            ParseError::MalformedLine { fields } => assert_eq!(fields, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_timestamp() {
        let line = "c|not-a-time|2026-01-05T10:00:00Z|t|ns|m|p|ph|sh";
        let err = parse_line(line).unwrap_err();
        match err {
            ParseError::Timestamp { field, value } => {
                assert_eq!(field, "sub");
                assert_eq!(value, "not-a-time");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_permissive_timestamps() {
        // Naive, space-separated, fractional — all accepted as UTC
        let line = "c|2026-01-05 10:00:01.250|2026-01-05T10:00:01|t|ns|m|p|ph|sh";
        let rec = parse_line(line).unwrap();
        assert_eq!((rec.sub_ts - rec.pub_ts).num_milliseconds(), 250);
    }

    #[test]
    fn test_payload_size_is_char_count() {
        // 4 multibyte chars — size counts characters, not bytes
        let line = "c|2026-01-05T10:00:01Z|2026-01-05T10:00:00Z|t|ns|m|äöüß|ph|sh";
        let rec = parse_line(line).unwrap();
        assert_eq!(rec.payload_size, 4);
    }

    #[test]
    fn test_sub_host_without_quote_kept_whole() {
        let line = make_line("c", "plain-host");
        let rec = parse_line(&line).unwrap();
        assert_eq!(rec.sub_host, "plain-host");
    }
}
