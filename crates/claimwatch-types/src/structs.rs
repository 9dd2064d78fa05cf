//! Core entity structs: settlements, polities and account sightings.
//!
//! These are the shapes produced by the parser crate and consumed by the
//! store and the reconciler. Every text field uses the empty string as its
//! "unknown" value and every list uses the empty list, so a record is always
//! fully populated even when extraction was only partially successful.

use serde::{Deserialize, Serialize};

/// Elevation used when a marker carries neither `y` nor `ytop`.
pub const DEFAULT_ELEVATION: f64 = 64.0;

/// A point on the game map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// East-west coordinate.
    pub x: f64,
    /// Elevation.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
}

impl Position {
    /// Create a position from its three coordinates.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: DEFAULT_ELEVATION,
            z: 0.0,
        }
    }
}

/// Polity sub-fields found inside one settlement's description.
///
/// Only meaningful on the settlement that carried them; the polity record
/// itself is seeded from the first settlement that mentions it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolityHint {
    /// Polity tier label.
    pub tier: String,
    /// Name of the capital settlement.
    pub capital: String,
    /// Settlement names the polity claims, in listed order.
    pub territories: Vec<String>,
}

impl PolityHint {
    /// True when the description carried no polity sub-fields at all.
    pub fn is_empty(&self) -> bool {
        self.tier.is_empty() && self.capital.is_empty() && self.territories.is_empty()
    }
}

/// A claimed territorial unit recovered from one map marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// Natural key, taken from the description heading.
    pub name: String,
    /// Marker display label.
    pub label: String,
    /// Marker position.
    pub position: Position,
    /// Free-text tier classification.
    pub tier: String,
    /// Account recorded as primary controller.
    pub steward: String,
    /// Free-text treasury balance, currency-agnostic.
    pub treasury: String,
    /// Claimed area in chunks.
    pub area: u64,
    /// Member accounts, ordered and without duplicates.
    pub members: Vec<String>,
    /// Owning polity name, empty when unaffiliated.
    pub polity: String,
    /// Polity sub-fields carried by this settlement's description.
    pub polity_hint: PolityHint,
}

impl Settlement {
    /// True when the settlement belongs to a polity.
    pub fn is_affiliated(&self) -> bool {
        !self.polity.trim().is_empty()
    }
}

/// A polity as derived from a single ingestion batch.
///
/// Carries no aggregates: those are recomputed against persisted state by
/// the reconciler, never from a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolityCandidate {
    /// Natural key.
    pub name: String,
    /// Polity tier label.
    pub tier: String,
    /// Capital settlement name.
    pub capital: String,
    /// Claimed settlement names.
    pub territories: Vec<String>,
}

impl PolityCandidate {
    /// Seed a candidate from the hint carried by a settlement.
    pub fn seeded(name: &str, hint: &PolityHint) -> Self {
        Self {
            name: name.to_owned(),
            tier: hint.tier.clone(),
            capital: hint.capital.clone(),
            territories: hint.territories.clone(),
        }
    }
}

/// Derived polity statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolityAggregates {
    /// Length of the persisted territory list.
    pub territory_count: u64,
    /// Distinct member accounts across found territories.
    pub member_count: u64,
    /// Sum of found territories' area.
    pub total_area: u64,
}

/// One account observed in the live player payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSighting {
    /// Natural key.
    pub account: String,
    /// Display name shown on the map.
    pub display_name: String,
    /// World the account was seen in.
    pub world: String,
    /// Last known position.
    pub position: Position,
    /// Health at sighting time.
    pub health: f64,
    /// Armor points at sighting time.
    pub armor: i64,
    /// Marker sort order reported by the map.
    pub sort: i64,
    /// Marker type reported by the map.
    pub kind: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_position_sits_at_default_elevation() {
        let p = Position::default();
        assert!((p.y - DEFAULT_ELEVATION).abs() < f64::EPSILON);
    }

    #[test]
    fn blank_polity_is_unaffiliated() {
        let mut s = Settlement::default();
        assert!(!s.is_affiliated());
        s.polity = "  ".to_owned();
        assert!(!s.is_affiliated());
        s.polity = "Northreach".to_owned();
        assert!(s.is_affiliated());
    }

    #[test]
    fn seeded_candidate_copies_hint() {
        let hint = PolityHint {
            tier: "2".to_owned(),
            capital: "Riverton".to_owned(),
            territories: vec!["Riverton".to_owned(), "Oakvale".to_owned()],
        };
        let c = PolityCandidate::seeded("Northreach", &hint);
        assert_eq!(c.name, "Northreach");
        assert_eq!(c.capital, "Riverton");
        assert_eq!(c.territories.len(), 2);
    }

    #[test]
    fn empty_hint_detected() {
        assert!(PolityHint::default().is_empty());
    }
}
