//! Lenient decoding. A single corrupt record or line is dropped and logged;
//! it never hides the records around it.

use super::types::Record;
use serde::de::DeserializeOwned;

/// Parse newline-delimited JSON. Blank lines are ignored, lines that fail to
/// decode or validate are skipped.
pub fn parse_jsonl<T: DeserializeOwned + Record>(text: &str, source: &str) -> Vec<T> {
    let mut out = Vec::new();
    let mut skipped = 0usize;

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line).map_err(|e| e.to_string()).and_then(|r| {
            r.validate()?;
            Ok(r)
        }) {
            Ok(record) => out.push(record),
            Err(e) => {
                skipped += 1;
                tracing::debug!(source, line = idx + 1, error = %e, "skipping malformed jsonl line");
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(source, skipped, kept = out.len(), "dropped malformed jsonl lines");
    }
    out
}

/// Decode the records of a JSON array one at a time against `T`'s schema.
pub fn decode_records<T: DeserializeOwned + Record>(
    values: Vec<serde_json::Value>,
    source: &str,
) -> Vec<T> {
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .filter_map(|v| {
            let record = match serde_json::from_value::<T>(v) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(source, error = %e, "dropping undecodable record");
                    return None;
                }
            };
            match record.validate() {
                Ok(()) => Some(record),
                Err(e) => {
                    tracing::debug!(source, error = %e, "dropping invalid record");
                    None
                }
            }
        })
        .collect();

    if records.len() < total {
        tracing::warn!(source, dropped = total - records.len(), kept = records.len(), "dropped invalid records");
    }
    records
}

/// Keep the last `n` lines of a text blob, the way a tail would.
pub fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// Keep the newest `n` entries of an append-ordered list.
pub fn keep_last<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    if items.len() > n {
        items.drain(..items.len() - n);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::types::{FeedAlert, Trade};

    #[test]
    fn test_corrupt_line_does_not_hide_neighbours() {
        let text = concat!(
            r#"{"timestamp":"2026-03-01T10:00:00Z","level":"warn","message":"first"}"#, "\n",
            "{this is not json\n",
            "\n",
            r#"{"timestamp":"2026-03-01T10:05:00Z","message":"third"}"#, "\n",
        );
        let alerts: Vec<FeedAlert> = parse_jsonl(text, "alerts.jsonl");
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].message, "first");
        assert_eq!(alerts[1].message, "third");
    }

    #[test]
    fn test_schema_violation_is_skipped() {
        // valid json, but an open trade must not carry exit fields
        let text = concat!(
            r#"{"id":"1","asset":"BTC","direction":"LONG","entryPrice":1.0,"entryTime":"2026-03-01T10:00:00Z","status":"OPEN","exitPrice":2.0}"#, "\n",
            r#"{"id":"2","asset":"BTC","direction":"LONG","entryPrice":1.0,"entryTime":"2026-03-01T10:00:00Z","status":"OPEN"}"#, "\n",
        );
        let trades: Vec<Trade> = parse_jsonl(text, "trades.jsonl");
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, "2");
    }

    #[test]
    fn test_decode_records_keeps_valid() {
        let values = vec![
            serde_json::json!({"timestamp":"2026-03-01T10:00:00Z","message":"ok"}),
            serde_json::json!({"timestamp":"garbage","message":"bad ts"}),
            serde_json::json!({"timestamp":"2026-03-01T10:00:00Z","message":""}),
        ];
        let alerts: Vec<FeedAlert> = decode_records(values, "test");
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn test_tail_lines() {
        let text = "a\nb\nc\nd\n";
        assert_eq!(tail_lines(text, 2), vec!["c", "d"]);
        assert_eq!(tail_lines(text, 10).len(), 4);
        assert!(tail_lines("", 5).is_empty());
    }

    #[test]
    fn test_keep_last() {
        assert_eq!(keep_last(vec![1, 2, 3, 4], 2), vec![3, 4]);
        assert_eq!(keep_last(vec![1], 2), vec![1]);
    }
}
