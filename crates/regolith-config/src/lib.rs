//! Configuration for Regolith: RON files with defaults for every tunable,
//! plus CLI overrides.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, InputConfig, NetworkConfig, SimConfig};
pub use error::ConfigError;
