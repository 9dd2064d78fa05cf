//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: claimwatch_core::config::ConfigError,
    },

    /// A database operation failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying database error.
        #[from]
        source: claimwatch_db::DbError,
    },

    /// An ingestion cycle failed.
    #[error("cycle error: {source}")]
    Cycle {
        /// The underlying cycle error.
        #[from]
        source: claimwatch_core::cycle::CycleError,
    },

    /// Reconciliation could not start.
    #[error("reconcile error: {source}")]
    Reconcile {
        /// The underlying reconciliation error.
        #[from]
        source: claimwatch_core::reconcile::ReconcileError,
    },

    /// A view could not be rendered as JSON.
    #[error("json error: {source}")]
    Json {
        /// The underlying serializer error.
        #[from]
        source: serde_json::Error,
    },

    /// An export file could not be written.
    #[error("io error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The HTTP client could not be built.
    #[error("http client error: {message}")]
    Http {
        /// Description of the failure.
        message: String,
    },

    /// A named record does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Record kind.
        kind: &'static str,
        /// Requested name.
        name: String,
    },
}
