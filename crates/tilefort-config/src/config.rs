//! Configuration structs with defaults and RON persistence.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const FILE_NAME: &str = "config.ron";

/// Top-level configuration shared by the server and client binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    /// Chunk request servicing and build-order broadcasting.
    pub sync: SyncConfig,
    pub world: WorldConfig,
    /// Tick rates.
    pub tick: TickConfig,
    pub client: ClientConfig,
    pub debug: DebugConfig,
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the client connects to, or the server binds to.
    pub server_address: String,
    pub port: u16,
    /// Identifier both ends must agree on during the handshake.
    pub app_id: String,
    /// Handshake and shutdown timeout in seconds.
    pub timeout_seconds: u32,
    /// Maximum concurrent connections (server only).
    pub max_connections: usize,
    /// Largest accepted frame payload in bytes.
    pub max_payload_bytes: u32,
}

/// Chunk streaming and build-order broadcast tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Chunk requests answered per server tick.
    pub requests_per_tick: usize,
    /// Server ticks between build-order broadcasts.
    pub broadcast_interval: u32,
    /// Milliseconds a client waits before asking for a chunk again.
    pub chunk_retry_ms: u64,
}

/// Terrain generation and deferred build orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Terrain generator seed.
    pub seed: u32,
    /// Ticks a build order may wait for its chunk before it is dropped.
    pub max_pending_ticks: u32,
    /// Terrain noise frequency per tile.
    pub noise_frequency: f64,
}

/// Update rates of both binaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TickConfig {
    /// Server updates per second.
    pub server_rate: u32,
    /// Client updates per second.
    pub client_rate: u32,
    /// Upper bound on the elapsed time reported to one update, in ms.
    pub max_elapsed_ms: u64,
}

/// Client-only settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Radius, in chunks, of the square the client keeps loaded.
    pub draw_distance: i32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level filter (e.g. "debug", "info", "warn"). `RUST_LOG` wins.
    pub log_level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            port: 35553,
            app_id: "TileFortress".to_string(),
            timeout_seconds: 5,
            max_connections: 64,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            requests_per_tick: 250,
            broadcast_interval: 1,
            chunk_retry_ms: 2000,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 12345,
            max_pending_ticks: 400,
            noise_frequency: 1.0 / 24.0,
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            server_rate: 40,
            client_rate: 20,
            max_elapsed_ms: 250,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { draw_distance: 5 }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl NetworkConfig {
    /// `timeout_seconds` as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl SyncConfig {
    /// `chunk_retry_ms` as a [`Duration`].
    pub fn chunk_retry(&self) -> Duration {
        Duration::from_millis(self.chunk_retry_ms)
    }
}

impl TickConfig {
    /// `max_elapsed_ms` as a [`Duration`].
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

impl Config {
    /// Reads `config.ron` from `config_dir`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(FILE_NAME);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Using config {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", config_path.display());
            Ok(config)
        }
    }

    /// Writes `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::Write)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(config_dir.join(FILE_NAME), serialized).map_err(ConfigError::Write)?;
        Ok(())
    }

    /// Re-reads the file. Returns `Some(new_config)` only if it differs.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(FILE_NAME))?;
        if &new_config != self {
            log::info!("Config file changed on disk");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        ron::from_str(&contents).map_err(ConfigError::Parse)
    }
}
