//! Payload parsing for claimwatch.
//!
//! Everything in this crate is pure and synchronous: JSON in, typed records
//! out. Nothing here touches the network or the store.
//!
//! # Modules
//!
//! - [`html`] -- Tolerant HTML scanner used on marker tooltips
//! - [`vocabulary`] -- Label vocabulary for description fields
//! - [`description`] -- Settlement description parsing
//! - [`extract`] -- Settlement extraction from the marker payload
//! - [`accounts`] -- Account sightings from the player payload
//! - [`polity`] -- Polity candidates from an extracted batch
//! - [`error`] -- Anomaly types

pub mod accounts;
pub mod description;
pub mod error;
pub mod extract;
pub mod html;
pub mod polity;
pub mod vocabulary;

pub use accounts::parse_accounts;
pub use description::{DescriptionFields, ParsedDescription, parse_description};
pub use error::{ExtractionAnomaly, PayloadAnomaly};
pub use extract::{ExtractOptions, Extraction, extract_settlements};
pub use polity::derive_polities;
pub use vocabulary::Vocabulary;
