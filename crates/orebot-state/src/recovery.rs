//! Best-effort payload reconstruction.
//!
//! Runs only after the primary file and every backup slot have failed
//! validation. Two heuristics are tried against each candidate's raw
//! bytes, most recent candidate first: bracket extraction (slice between
//! the first `{` and the last `}` and try to parse it) and truncation
//! repair (trim a trailing unterminated string literal, drop a dangling
//! key, close unmatched braces, then try to parse). If every candidate
//! resists both, the component's defaults are used. Whatever payload
//! results is re-persisted through the atomic writer so later reads do
//! not repeat the recovery. This module never fails — output quality
//! degrades from exact recovery to safe defaults.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::backup::{self, BACKUP_SLOTS};
use crate::defaults;
use crate::writer;

/// Reconstruct a usable payload for `path` and persist it.
pub fn recover(path: &Path, component: &str, schema_version: u32) -> Value {
    let payload = salvage(path).unwrap_or_else(|| {
        warn!(
            path = %path.display(),
            component,
            "recovery heuristics failed, falling back to defaults"
        );
        defaults::for_component(component)
    });

    if let Err(err) = writer::atomic_write(path, &payload, schema_version) {
        warn!(path = %path.display(), error = %err, "failed to persist recovered payload");
    }
    payload
}

fn salvage(path: &Path) -> Option<Value> {
    let mut candidates = vec![("primary".to_string(), path.to_path_buf())];
    for slot in 1..=BACKUP_SLOTS {
        candidates.push((format!("bak{slot}"), backup::slot_path(path, slot)));
    }

    for (label, candidate) in candidates {
        let Ok(bytes) = fs::read(&candidate) else {
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);

        if let Some(payload) = extract_braced(&text) {
            info!(path = %path.display(), source = %label, "payload recovered via bracket extraction");
            return Some(payload);
        }
        if let Some(payload) = repair_truncation(&text) {
            info!(path = %path.display(), source = %label, "payload recovered via truncation repair");
            return Some(payload);
        }
    }
    None
}

// ── heuristics ───────────────────────────────────────────────────────

/// Slice between the first `{` and the last `}` and try to parse.
fn extract_braced(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_payload(&text[start..=end])
}

/// Repair a tail-truncated file: cut from the first `{`, trim a trailing
/// unterminated string, drop dangling separators and keys, close every
/// unmatched brace, then try to parse.
fn repair_truncation(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let body = trim_unterminated_string(&text[start..]);
    let body = body.trim_end_matches(&[',', ':', ' ', '\t', '\n', '\r'][..]);
    let body = trim_dangling_key(body);
    let body = body.trim_end_matches(&[',', ' ', '\t', '\n', '\r'][..]);

    let mut repaired = body.to_string();
    for closer in unmatched_closers(body) {
        repaired.push(closer);
    }
    parse_payload(&repaired)
}

/// Parse a candidate slice as a payload map, unwrapping an envelope that
/// happens to have survived intact inside the bytes. Empty maps are
/// rejected — they carry no state and defaults serve better.
fn parse_payload(slice: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(slice).ok()?;
    let map = value.as_object()?;
    if map.is_empty() {
        return None;
    }
    if map.contains_key("payload") && map.contains_key("checksum") {
        return match map.get("payload") {
            Some(Value::Object(inner)) if !inner.is_empty() => Some(Value::Object(inner.clone())),
            _ => None,
        };
    }
    Some(value)
}

/// If the text ends inside a string literal, cut back to the quote that
/// opened it.
fn trim_unterminated_string(text: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start = 0;
    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
            string_start = idx;
        }
    }
    if in_string { &text[..string_start] } else { text }
}

/// If the text ends with a complete string that is a map key with no
/// value (`{"a":1,"b"` or `{"b"`), cut the key (and a preceding comma).
fn trim_dangling_key(text: &str) -> &str {
    let trimmed = text.trim_end();
    if !trimmed.ends_with('"') {
        return text;
    }

    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    let mut last_span: Option<(usize, usize)> = None;
    for (idx, ch) in trimmed.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                last_span = Some((start, idx));
            }
        } else if ch == '"' {
            in_string = true;
            start = idx;
        }
    }

    let Some((key_start, key_end)) = last_span else {
        return text;
    };
    if key_end + 1 != trimmed.len() {
        return text;
    }
    let before = trimmed[..key_start].trim_end();
    if let Some(cut) = before.strip_suffix(',') {
        return cut;
    }
    if before.ends_with('{') {
        return before;
    }
    text
}

/// Closers for every `{` and `[` left open outside string literals, in
/// innermost-first order.
fn unmatched_closers(text: &str) -> Vec<char> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    stack.reverse();
    stack
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use crate::reader;
    use serde_json::json;

    #[test]
    fn bracket_extraction_unwraps_surviving_envelope() {
        let envelope = Envelope::seal(json!({"x": 10, "y": 64}), 3).unwrap();
        let mut bytes = b"\x00\x00noise".to_vec();
        bytes.extend_from_slice(&envelope.to_bytes().unwrap());
        bytes.extend_from_slice(b"trailing junk");

        let payload = extract_braced(&String::from_utf8_lossy(&bytes)).unwrap();
        assert_eq!(payload, json!({"x": 10, "y": 64}));
    }

    #[test]
    fn bracket_extraction_accepts_bare_payload_map() {
        let payload = extract_braced(r#"garbage {"depth": 12, "active": true} more"#).unwrap();
        assert_eq!(payload, json!({"depth": 12, "active": true}));
    }

    #[test]
    fn truncation_repair_closes_braces() {
        let payload = repair_truncation(r#"{"pos":{"x":1,"y":2},"targets":[[10,64"#).unwrap();
        assert_eq!(payload, json!({"pos": {"x": 1, "y": 2}, "targets": [[10, 64]]}));
    }

    #[test]
    fn truncation_repair_trims_unterminated_string() {
        let payload = repair_truncation(r#"{"name":"alpha","pos":{"x":1,"note":"cut her"#).unwrap();
        assert_eq!(payload, json!({"name": "alpha", "pos": {"x": 1}}));
    }

    #[test]
    fn truncation_repair_drops_dangling_key() {
        let payload = repair_truncation(r#"{"a":1,"b""#).unwrap();
        assert_eq!(payload, json!({"a": 1}));
    }

    #[test]
    fn hopeless_bytes_defeat_both_heuristics() {
        assert!(extract_braced("no braces at all").is_none());
        assert!(repair_truncation("no braces at all").is_none());
        assert!(extract_braced("\x00\x01\x02").is_none());
    }

    #[test]
    fn recover_falls_back_to_defaults_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.json");
        std::fs::write(&path, b"\x00\x01\x02 hopeless").unwrap();

        let payload = recover(&path, "position", 3);
        assert_eq!(payload, defaults::for_component("position"));

        // The recovered payload was re-persisted as a valid envelope.
        let reread = reader::read_and_validate(&path).unwrap();
        assert_eq!(reread.payload, payload);
    }

    #[test]
    fn recover_prefers_most_recent_salvageable_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mining.json");

        // Primary is a truncated envelope; bak1 holds an older intact one.
        let old = Envelope::seal(json!({"depth": 3}), 3).unwrap();
        std::fs::write(backup::slot_path(&path, 1), old.to_bytes().unwrap()).unwrap();
        std::fs::write(&path, br#"{"schema_version":3,"checksum":9,"timestamp":0,"payload":{"depth":4"#)
            .unwrap();

        let payload = recover(&path, "mining", 3);
        assert_eq!(payload, json!({"depth": 4}));
    }
}
