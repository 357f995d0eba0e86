//! Dot-delimited path keys.
//!
//! A path like `"position.x"` or `"mining.targets.0"` is parsed into a
//! validated segment sequence before any navigation happens. The first
//! segment selects a component (falling back to the default component
//! when it is not a recognized name); the remaining segments walk the
//! component's payload tree. On reads a numeric segment indexes into a
//! sequence; on writes every missing or non-map intermediate is coerced
//! into a fresh empty map, never silently overwritten in place.

use serde_json::{Map, Value};

use crate::error::{StateError, StateResult};

/// A parsed, validated dot-delimited address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathKey {
    segments: Vec<String>,
}

impl PathKey {
    /// Parse `raw` into segments, rejecting empty paths and empty segments.
    pub fn parse(raw: &str) -> StateResult<Self> {
        if raw.is_empty() {
            return Err(StateError::InvalidArgument("empty path".into()));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(StateError::InvalidArgument(format!(
                "path {raw:?} contains an empty segment"
            )));
        }
        Ok(Self { segments })
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Split off the leading component name.
    ///
    /// Returns `(component, remaining_segments)`. If the first segment is
    /// not a recognized component identifier the whole path is addressed
    /// into `default`.
    #[must_use]
    pub fn resolve<'a>(&'a self, components: &[&str], default: &'a str) -> (&'a str, &'a [String]) {
        let first = self.segments[0].as_str();
        if components.contains(&first) {
            (first, &self.segments[1..])
        } else {
            (default, &self.segments[..])
        }
    }
}

// ── tree navigation ──────────────────────────────────────────────────

/// Walk `segments` down a payload tree, returning the addressed value.
///
/// Map segments are looked up by key; sequence segments by index when
/// the segment parses as one.
#[must_use]
pub fn get_in<'a>(root: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = root.get(first)?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `segments`, creating intermediate maps as needed.
///
/// An intermediate that already holds a scalar or a sequence is replaced
/// by a new empty map before descending.
pub fn set_in(root: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        root.insert(first.clone(), value);
        return;
    }
    let entry = root
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
        set_in(map, rest, value);
    }
}

/// Remove the value at `segments`, returning whether anything was removed.
///
/// Only map entries can be deleted; addressing through a scalar or a
/// sequence yields `false`.
pub fn delete_in(root: &mut Map<String, Value>, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return root.remove(first).is_some();
    }
    match root.get_mut(first) {
        Some(Value::Object(map)) => delete_in(map, rest),
        _ => false,
    }
}

// ── tests ────────────────────────────────────────────────────────────
