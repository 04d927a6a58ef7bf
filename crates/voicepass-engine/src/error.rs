//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that can abort startup. Once the
//! engine is running, per-message failures are logged and never surface
//! here.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: voicepass_core::config::ConfigError,
    },

    /// The level table or item catalog failed to load.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: voicepass_core::CatalogError,
    },

    /// The profile store could not be reached.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: voicepass_db::DbError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Installing a shutdown signal handler failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
