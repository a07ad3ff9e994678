//! Issue change detection.
//!
//! A fingerprint is a SHA-256 digest over a canonical rendering of the
//! raw issue JSON, with known-volatile fields zeroed first. Matching
//! fingerprints mean "already imported and unchanged"; any semantic
//! change to the issue produces a different digest.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Computes the fingerprint of a raw Jira issue.
///
/// `volatile_fields` names issue fields that change without the issue
/// itself changing (e.g. `lastViewed`); they are replaced with an empty
/// string before hashing so they cannot trigger a re-import.
#[must_use]
pub fn issue_fingerprint(issue: &Value, volatile_fields: &[String]) -> String {
    let mut normalized = issue.clone();
    if let Some(fields) = normalized.get_mut("fields").and_then(Value::as_object_mut) {
        for field in volatile_fields {
            if fields.contains_key(field) {
                fields.insert(field.clone(), Value::String(String::new()));
            }
        }
    }

    let mut canonical = String::new();
    write_canonical(&normalized, &mut canonical);

    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Writes a deterministic JSON rendering: object keys sorted, no
/// whitespace. Key order in the wire payload must not affect the hash.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volatile() -> Vec<String> {
        vec!["lastViewed".to_string()]
    }

    #[test]
    fn identical_issues_have_identical_fingerprints() {
        let a = json!({"key": "P1-1", "fields": {"summary": "title", "labels": ["x"]}});
        let b = json!({"key": "P1-1", "fields": {"summary": "title", "labels": ["x"]}});
        assert_eq!(
            issue_fingerprint(&a, &volatile()),
            issue_fingerprint(&b, &volatile())
        );
    }

    #[test]
    fn key_order_does_not_affect_fingerprint() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"key":"P1-1","fields":{"a":1,"b":2}}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"fields":{"b":2,"a":1},"key":"P1-1"}"#).unwrap();
        assert_eq!(
            issue_fingerprint(&a, &volatile()),
            issue_fingerprint(&b, &volatile())
        );
    }

    #[test]
    fn changing_a_field_changes_the_fingerprint() {
        let a = json!({"key": "P1-1", "fields": {"summary": "title"}});
        let b = json!({"key": "P1-1", "fields": {"summary": "changed"}});
        assert_ne!(
            issue_fingerprint(&a, &volatile()),
            issue_fingerprint(&b, &volatile())
        );
    }

    #[test]
    fn volatile_fields_are_ignored() {
        let a = json!({"key": "P1-1", "fields": {"summary": "t", "lastViewed": "2024-01-01"}});
        let b = json!({"key": "P1-1", "fields": {"summary": "t", "lastViewed": "2025-06-30"}});
        assert_eq!(
            issue_fingerprint(&a, &volatile()),
            issue_fingerprint(&b, &volatile())
        );
    }

    #[test]
    fn fingerprint_is_nonempty_hex() {
        let a = json!({"key": "P1-1", "fields": {}});
        let fp = issue_fingerprint(&a, &volatile());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
