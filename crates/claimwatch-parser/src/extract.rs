//! Settlement extraction from the marker payload.
//!
//! The payload nests land-claim markers under
//! `sets.<marker set>.areas` and `sets.<marker set>.markers`. Both maps are
//! merged, marker entries replacing area entries with the same key, and
//! every entry carrying a `label` and a `desc` becomes one [`Settlement`].

use std::collections::BTreeMap;

use claimwatch_types::{DEFAULT_ELEVATION, Position, Settlement};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::description::parse_description;
use crate::error::PayloadAnomaly;
use crate::vocabulary::Vocabulary;

/// Extraction settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Key under `sets` holding the land-claim markers.
    #[serde(default = "default_marker_set")]
    pub marker_set: String,

    /// Settlement name used by the server for its spawn region, which is
    /// never ingested.
    #[serde(default = "default_spawn_name")]
    pub spawn_name: String,

    /// Description labels.
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

fn default_marker_set() -> String {
    "me.angeschossen.lands".to_owned()
}

fn default_spawn_name() -> String {
    "出生点".to_owned()
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            marker_set: default_marker_set(),
            spawn_name: default_spawn_name(),
            vocabulary: Vocabulary::default(),
        }
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Settlements in entry-key order.
    pub settlements: Vec<Settlement>,
    /// Entries without `label` or `desc`.
    pub skipped: usize,
    /// Entries dropped because of their name (spawn sentinel or empty).
    pub dropped: usize,
    /// Total anomalies recovered from across all descriptions.
    pub anomalies: usize,
}

/// Extract every settlement from a marker payload.
pub fn extract_settlements(
    payload: &Value,
    options: &ExtractOptions,
) -> Result<Extraction, PayloadAnomaly> {
    let set = payload
        .get("sets")
        .ok_or_else(|| PayloadAnomaly::MissingKey("sets".to_owned()))?
        .get(&options.marker_set)
        .ok_or_else(|| PayloadAnomaly::MissingKey(options.marker_set.clone()))?;

    let mut entries: BTreeMap<&str, &Value> = BTreeMap::new();
    for section in ["areas", "markers"] {
        if let Some(map) = section_map(set, section) {
            entries.extend(map.iter().map(|(k, v)| (k.as_str(), v)));
        }
    }

    let mut out = Extraction::default();
    for (key, entry) in entries {
        let (Some(label), Some(desc)) = (
            entry.get("label").and_then(Value::as_str),
            entry.get("desc").and_then(Value::as_str),
        ) else {
            out.skipped = out.skipped.saturating_add(1);
            continue;
        };

        let parsed = parse_description(desc, &options.vocabulary);
        out.anomalies = out.anomalies.saturating_add(parsed.anomalies.len());
        let fields = parsed.fields;

        if fields.name.is_empty() {
            warn!(entry = key, label, "dropping marker with no settlement name");
            out.dropped = out.dropped.saturating_add(1);
            continue;
        }
        if fields.name == options.spawn_name {
            out.dropped = out.dropped.saturating_add(1);
            continue;
        }

        out.settlements.push(Settlement {
            name: fields.name,
            label: label.to_owned(),
            position: position(entry),
            tier: fields.tier,
            steward: fields.steward,
            treasury: fields.treasury,
            area: fields.area,
            members: fields.members,
            polity: fields.polity,
            polity_hint: fields.polity_hint,
        });
    }

    debug!(
        settlements = out.settlements.len(),
        skipped = out.skipped,
        dropped = out.dropped,
        anomalies = out.anomalies,
        "marker payload extracted"
    );
    Ok(out)
}

fn section_map<'a>(set: &'a Value, section: &str) -> Option<&'a Map<String, Value>> {
    let value = set.get(section)?;
    let map = value.as_object();
    if map.is_none() && !value.is_null() {
        warn!(section, "marker section is not an object, ignoring");
    }
    map
}

/// Marker position. `y` falls back to `ytop`, then to the default elevation.
fn position(entry: &Value) -> Position {
    let y = entry
        .get("y")
        .or_else(|| entry.get("ytop"))
        .map_or(DEFAULT_ELEVATION, coordinate);
    Position::new(
        entry.get("x").map_or(0.0, coordinate),
        y,
        entry.get("z").map_or(0.0, coordinate),
    )
}

/// A coordinate given as a number, a numeric string, or a sequence whose
/// first element is one of those. Anything else reads as zero.
fn coordinate(value: &Value) -> f64 {
    let scalar = match value {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    match scalar {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
