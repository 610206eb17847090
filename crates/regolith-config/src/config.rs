//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World and simulation settings.
    pub sim: SimConfig,
    /// Networking settings.
    pub network: NetworkConfig,
    /// Input settings.
    pub input: InputConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World and simulation settings. These feed the deterministic step and
/// must match between server and clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Chunks along one grid edge (the world is this cubed).
    pub grid_edge_chunks: u32,
    /// Voxel edge length in world units.
    pub voxel_size: f32,
    /// Fixed simulation rate in Hz.
    pub tick_rate: u32,
    /// Iso-surface density threshold.
    pub surface_level: u8,
    /// Terraform tool reach in world units.
    pub terraform_range: f32,
    /// Terraform brush radius in voxels.
    pub terraform_radius: u32,
    /// Terraform rate in density units per second.
    pub terraform_rate: f32,
}

/// Networking settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address clients connect to.
    pub server_address: String,
    /// Server datagram port.
    pub server_port: u16,
    /// Client datagram port.
    pub client_port: u16,
    /// Snapshot dispatch rate in Hz.
    pub snapshot_rate: f32,
    /// Pending-command ring capacity per player.
    pub command_ring_capacity: usize,
}

/// Input settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Mouse sensitivity multiplier.
    pub mouse_sensitivity: f32,
    /// Invert the vertical mouse axis.
    pub invert_y: bool,
}

/// Debug/development settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g. "debug", "regolith_net=trace").
    pub log_level: String,
    /// Draw chunk boundaries.
    pub show_chunk_boundaries: bool,
    /// Draw collision triangle candidates.
    pub show_collision_triangles: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid_edge_chunks: 5,
            voxel_size: 9.0,
            tick_rate: 50,
            surface_level: 60,
            terraform_range: 70.0,
            terraform_radius: 2,
            terraform_rate: 700.0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 6000,
            client_port: 6001,
            snapshot_rate: 25.0,
            command_ring_capacity: 64,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 15.0,
            invert_y: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            show_chunk_boundaries: false,
            show_collision_triangles: false,
        }
    }
}

impl Config {
    /// Loads config from the given directory, or creates a default file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
            let config: Config = ron::from_str(&contents)?;
            info!("loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            info!("created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Saves config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Write)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true);

        let serialized = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&config_path, serialized).map_err(ConfigError::Write)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` when the file changed.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::Read)?;
        let new_config: Config = ron::from_str(&contents)?;

        if &new_config != self {
            info!("config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
