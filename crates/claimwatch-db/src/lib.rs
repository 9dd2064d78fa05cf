//! Data layer for claimwatch.
//!
//! The ingestion core only ever talks to the [`Store`] trait. Two
//! implementations ship here:
//!
//! ```text
//! Store (trait)
//!     |
//!     +-- PgStore      PostgreSQL via sqlx, used by the engine binary
//!     |
//!     +-- MemoryStore  ordered maps behind a tokio mutex, used by tests
//! ```
//!
//! # Modules
//!
//! - [`store`] -- The `Store` contract and row types
//! - [`postgres`] -- `PostgreSQL` pool, configuration and `PgStore`
//! - [`memory`] -- In-memory `Store`
//! - [`error`] -- Shared error types

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use memory::MemoryStore;
pub use postgres::{PgStore, PostgresConfig, PostgresPool};
pub use store::{AccountRow, FIRST_RUN_KEY, PolityRow, SettlementRow, Store, StoreCounts};
