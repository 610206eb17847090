//! Configuration error type.

use std::io;

/// Errors raised while loading, saving, or reloading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Read(#[source] io::Error),

    /// The config file could not be written.
    #[error("failed to write config: {0}")]
    Write(#[source] io::Error),

    /// The file exists but is not valid RON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed (should not happen for well-formed configs).
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}
