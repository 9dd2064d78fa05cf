//! Shared type definitions for claimwatch.
//!
//! This crate is the single source of truth for the records that flow
//! between the parser, the store and the reconciler.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for store row identities
//! - [`structs`] -- Settlements, polities, aggregates and account sightings

pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{AccountId, PolityId, SettlementId};
pub use structs::{
    AccountSighting, DEFAULT_ELEVATION, PolityAggregates, PolityCandidate, PolityHint, Position,
    Settlement,
};
