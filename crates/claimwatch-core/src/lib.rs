//! Ingestion cycle and read-side services for claimwatch.
//!
//! This crate owns the cycle that turns two remote JSON payloads into
//! persisted accounts, settlements and polities, recomputes polity
//! aggregates, and reports idle accounts.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `claimwatch-config.yaml`.
//! - [`transport`] -- [`Transport`] trait and an in-memory implementation.
//! - [`cycle`] -- One ingestion cycle and the first-run marker.
//! - [`runner`] -- Continuous mode around the cycle.
//! - [`reconcile`] -- Polity aggregate recomputation.
//! - [`inactivity`] -- Idle-account classification.
//! - [`query`] -- Profiles, rankings, search and statistics.
//! - [`report`] -- Bulletin formatting and sinks.
//! - [`shutdown`] -- Cooperative stop signal.
//!
//! [`Transport`]: transport::Transport

pub mod config;
pub mod cycle;
pub mod inactivity;
pub mod query;
pub mod reconcile;
pub mod report;
pub mod runner;
pub mod shutdown;
pub mod transport;
