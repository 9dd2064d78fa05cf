//! Error types for the `claimwatch-parser` crate.
//!
//! Two families live here. [`ExtractionAnomaly`] is a *recovered* problem:
//! the parser filled in an empty default and carried on, and the anomaly is
//! returned next to the record so callers can count or log it.
//! [`PayloadAnomaly`] is the only hard failure, raised when the payload does
//! not have the shape needed to find any records at all.

/// A sub-field of a description could not be read and was defaulted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionAnomaly {
    /// No heading span was found, so the settlement has no name.
    #[error("description has no heading span")]
    MissingName,

    /// The area list item was present but its value was not a whole number.
    #[error("area value is not numeric: {raw:?}")]
    AreaNotNumeric {
        /// Text found after the area label.
        raw: String,
    },

    /// The polity sentinel was found but no name could be cut out of it.
    #[error("polity heading has no readable name: {text:?}")]
    PolityNameUnreadable {
        /// Full text of the heading element.
        text: String,
    },

    /// The polity heading was found but no detail list follows it.
    #[error("polity {polity:?} has no detail list")]
    PolityDetailsMissing {
        /// Polity name read from the heading.
        polity: String,
    },
}

/// The payload lacks the structure needed to locate records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadAnomaly {
    /// A required key is absent.
    #[error("payload is missing key {0:?}")]
    MissingKey(String),

    /// A key is present but holds the wrong JSON type.
    #[error("payload key {key:?} is not {expected}")]
    WrongShape {
        /// The offending key.
        key: String,
        /// What the key should hold.
        expected: &'static str,
    },
}
