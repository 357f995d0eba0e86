//! Component registry and type-specific default payloads.
//!
//! A component is a named, independently persisted partition of robot
//! state. Defaults are what a component holds on first boot and what
//! corruption recovery falls back to when nothing on disk is salvageable.

use serde_json::{Value, json};

/// Every component the store persists, each mapped 1:1 to a state file.
pub const COMPONENTS: &[&str] = &["main", "position", "mining", "inventory", "network"];

/// Component that absorbs paths whose first segment is not a component name.
pub const DEFAULT_COMPONENT: &str = "main";

/// The default payload for `component`.
#[must_use]
pub fn for_component(component: &str) -> Value {
    match component {
        "position" => json!({
            "x": 0,
            "y": 0,
            "z": 0,
            "heading": "north",
            "dimension": "overworld",
        }),
        "mining" => json!({
            "pattern": "strip",
            "active": false,
            "depth": 0,
            "blocks_mined": 0,
            "targets": [],
        }),
        "inventory" => json!({
            "slots": [],
            "fuel_level": 0,
            "free_slots": 16,
        }),
        "network" => json!({
            "beacon_id": "",
            "last_contact": 0,
            "peers": [],
        }),
        "main" => json!({
            "boot_count": 0,
            "last_boot": 0,
            "flags": {},
        }),
        _ => json!({}),
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_component_defaults_to_a_map() {
        for component in COMPONENTS {
            assert!(
                for_component(component).is_object(),
                "{component} default is not a map"
            );
        }
    }

    #[test]
    fn default_component_is_registered() {
        assert!(COMPONENTS.contains(&DEFAULT_COMPONENT));
    }

    #[test]
    fn position_defaults_are_zeroed() {
        let position = for_component("position");
        assert_eq!(position["x"], 0);
        assert_eq!(position["y"], 0);
        assert_eq!(position["z"], 0);
    }
}
