//! Canonical encoding of the hashed fields of an audit record.
//!
//! The encoding is compact UTF-8 JSON whose layout is fixed by this module,
//! not by any map's iteration order, so a verifier written in any language
//! can reproduce it byte for byte:
//!
//! ```text
//! {"eventId":S,"tableName":S,"recordId":S,"action":S,"diffAfter":V,"previousHash":S,"createdAt":S}
//! ```
//!
//! - `S` is a JSON string as serde_json writes it.  `"` and `\` are
//!   backslash-escaped, U+0008, U+000C, U+000A, U+000D and U+0009 use their
//!   short escapes, other code points below U+0020 are written `\u00xx`
//!   (lowercase hex), and everything else is raw UTF-8.
//! - `action` is `INSERT`, `UPDATE` or `DELETE`.
//! - `V` is `null` when `diff_after` is absent.  Otherwise it is the JSON
//!   value with no whitespace, object keys sorted by their UTF-8 bytes,
//!   array order preserved, and numbers in serde_json's shortest
//!   round-trip form.
//! - `previousHash` is the predecessor's hash or `GENESIS`.
//! - `createdAt` is `YYYY-MM-DDTHH:MM:SS.mmmZ` (UTC, exactly three
//!   fractional digits).

use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;

use auditchain_contracts::record::{AuditAction, AuditRecord, PendingRecord};

/// The fields that participate in a record's hash, borrowed from wherever
/// they live.
#[derive(Debug, Clone, Copy)]
pub struct HashInput<'a> {
    pub event_id: &'a str,
    pub table_name: &'a str,
    pub record_id: &'a str,
    pub action: AuditAction,
    pub diff_after: Option<&'a Value>,
    pub previous_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

impl<'a> HashInput<'a> {
    /// The hash input of a stored record, re-derived from its own fields.
    pub fn from_record(record: &'a AuditRecord) -> Self {
        Self {
            event_id: &record.event_id,
            table_name: &record.table_name,
            record_id: &record.record_id,
            action: record.action,
            diff_after: record.diff_after.as_ref(),
            previous_hash: &record.previous_hash,
            created_at: record.created_at,
        }
    }

    pub fn from_pending(record: &'a PendingRecord) -> Self {
        Self {
            event_id: &record.event_id,
            table_name: &record.table_name,
            record_id: &record.record_id,
            action: record.action,
            diff_after: record.diff_after.as_ref(),
            previous_hash: &record.previous_hash,
            created_at: record.created_at,
        }
    }
}

/// Truncate a timestamp to the millisecond precision that gets hashed and
/// stored.  Writers stamp records with truncated times so that a stored
/// record always re-encodes to the bytes it was hashed from.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Render a timestamp the way the canonical encoding does.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Produce the canonical byte string for `input`.
pub fn canonical_encode(input: &HashInput<'_>) -> Vec<u8> {
    let fields: [(&str, Value); 7] = [
        ("eventId", Value::from(input.event_id)),
        ("tableName", Value::from(input.table_name)),
        ("recordId", Value::from(input.record_id)),
        ("action", Value::from(input.action.as_str())),
        ("diffAfter", input.diff_after.map_or(Value::Null, sort_keys)),
        ("previousHash", Value::from(input.previous_hash)),
        ("createdAt", Value::from(format_timestamp(&input.created_at))),
    ];

    // serde_json writes each value compactly; only the field order is ours.
    let mut out = String::with_capacity(256);
    out.push('{');
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(key);
        out.push_str("\":");
        out.push_str(&value.to_string());
    }
    out.push('}');

    out.into_bytes()
}

/// Copy of `value` whose objects, at every depth, hold their keys in UTF-8
/// byte order.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, item)| (key.clone(), sort_keys(item)))
                    .collect(),
            )
        }
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn input<'a>(diff: Option<&'a Value>, prev: &'a str) -> HashInput<'a> {
        HashInput {
            event_id: "EVT-20260112-000042",
            table_name: "orders",
            record_id: "1001",
            action: AuditAction::Update,
            diff_after: diff,
            previous_hash: prev,
            created_at: Utc.with_ymd_and_hms(2026, 1, 12, 8, 30, 5).unwrap()
                + chrono::Duration::milliseconds(7),
        }
    }

    #[test]
    fn field_order_is_fixed() {
        let diff = json!({ "status": "PAID" });
        let encoded = String::from_utf8(canonical_encode(&input(Some(&diff), "GENESIS"))).unwrap();
        assert_eq!(
            encoded,
            r#"{"eventId":"EVT-20260112-000042","tableName":"orders","recordId":"1001","action":"UPDATE","diffAfter":{"status":"PAID"},"previousHash":"GENESIS","createdAt":"2026-01-12T08:30:05.007Z"}"#
        );
    }

    #[test]
    fn absent_diff_encodes_as_null() {
        let encoded = String::from_utf8(canonical_encode(&input(None, "GENESIS"))).unwrap();
        assert!(encoded.contains(r#""diffAfter":null,"#));
    }

    #[test]
    fn nested_keys_are_sorted() {
        let diff = json!({ "z": 1, "a": { "y": [3, 2, { "k": null, "b": true }], "b": "x" } });
        let encoded = String::from_utf8(canonical_encode(&input(Some(&diff), "GENESIS"))).unwrap();
        assert!(encoded.contains(r#""diffAfter":{"a":{"b":"x","y":[3,2,{"b":true,"k":null}]},"z":1}"#));
    }

    #[test]
    fn strings_are_escaped() {
        let diff = json!({ "note": "line1\nline2 \"quoted\" \\ \u{01} é" });
        let encoded = String::from_utf8(canonical_encode(&input(Some(&diff), "GENESIS"))).unwrap();
        assert!(encoded.contains(r#""note":"line1\nline2 \"quoted\" \\ \u0001 é""#));
    }

    #[test]
    fn strings_are_written_by_serde_json() {
        let odd = "tab\there \u{1f} \u{7f} \u{2028} ☃ \"q\"";
        let encoded = String::from_utf8(canonical_encode(&HashInput {
            record_id: odd,
            ..input(None, "GENESIS")
        }))
        .unwrap();
        let expected = format!(r#""recordId":{},"#, serde_json::to_string(odd).unwrap());
        assert!(encoded.contains(&expected));
    }

    #[test]
    fn previous_hash_changes_encoding() {
        let a = canonical_encode(&input(None, "GENESIS"));
        let b = canonical_encode(&input(None, &"f".repeat(64)));
        assert_ne!(a, b);
    }

    #[test]
    fn timestamps_render_with_milliseconds() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2026-03-01T00:00:00.000Z");
    }

    #[test]
    fn truncation_drops_sub_millisecond_digits() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let truncated = truncate_to_millis(ts);
        assert_eq!(truncated.timestamp_subsec_nanos(), 123_000_000);
        assert_eq!(format_timestamp(&ts), format_timestamp(&truncated));
    }
}
