//! Error types for the nurturing engine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),
}

/// Configuration-related errors. Raised at construction, before any cycle runs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail transport errors.
///
/// Fetch failures abort the whole cycle; send failures are per-lead and
/// surface in the cycle summary instead of propagating.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Fetching inbound mail failed: {0}")]
    Fetch(String),

    #[error("Invalid mail address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Sending to {to} failed: {reason}")]
    Send { to: String, reason: String },
}

/// Lead store persistence errors. Fatal to the cycle — no partial commit.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Store file {path} is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Cycle orchestration errors.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("A nurturing cycle is already in progress")]
    CycleInProgress,
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
