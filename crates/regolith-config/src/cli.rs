//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Regolith command-line arguments. CLI values override settings loaded
/// from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "regolith", about = "Regolith voxel sandbox")]
pub struct CliArgs {
    /// Run as the authoritative server.
    #[arg(long)]
    pub server: bool,

    /// Connect to a server at this address.
    #[arg(long)]
    pub connect: Option<String>,

    /// Player name sent with the join request.
    #[arg(long, default_value = "saska")]
    pub name: String,

    /// Server port override.
    #[arg(long)]
    pub port: Option<u16>,

    /// Client port override.
    #[arg(long)]
    pub client_port: Option<u16>,

    /// Log filter (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to the config directory (overrides the default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Applies CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.connect {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(port) = args.client_port {
            self.network.client_port = port;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> CliArgs {
        CliArgs {
            server: false,
            connect: None,
            name: "saska".into(),
            port: None,
            client_port: None,
            log_level: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let mut args = empty_args();
        args.connect = Some("192.168.1.1".to_string());
        args.port = Some(7000);

        config.apply_cli_overrides(&args);
        assert_eq!(config.network.server_address, "192.168.1.1");
        assert_eq!(config.network.server_port, 7000);
        // Non-overridden fields retain defaults.
        assert_eq!(config.network.client_port, 6001);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&empty_args());
        assert_eq!(config, original);
    }
}
