//! Translates the loaded configuration into runtime settings.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tilefort_config::Config;
use tilefort_net::{FrameConfig, TcpConfig};
use tilefort_sync::ServerSettings;
use tilefort_world::{TerrainGenerator, WorldSettings};

/// TCP transport settings for the listening side.
pub fn tcp_config(config: &Config) -> TcpConfig {
    TcpConfig {
        app_id: config.network.app_id.clone(),
        max_connections: config.network.max_connections,
        handshake_timeout: config.network.timeout(),
        frame: FrameConfig {
            max_payload_size: config.network.max_payload_bytes,
        },
        ..TcpConfig::default()
    }
}

/// Session settings from the `sync`, `network` and `world` sections.
pub fn server_settings(config: &Config) -> ServerSettings {
    ServerSettings {
        app_id: config.network.app_id.clone(),
        requests_per_tick: config.sync.requests_per_tick,
        broadcast_interval: config.sync.broadcast_interval,
        shutdown_timeout: config.network.timeout(),
        world: WorldSettings {
            max_pending_ticks: config.world.max_pending_ticks,
        },
        ..ServerSettings::default()
    }
}

/// Terrain supplier seeded from the `world` section.
pub fn generator(config: &Config) -> TerrainGenerator {
    TerrainGenerator::with_frequency(config.world.seed, config.world.noise_frequency)
}

/// Resolves the configured host and port to a socket address.
pub fn bind_addr(config: &Config) -> io::Result<SocketAddr> {
    (config.network.server_address.as_str(), config.network.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address for {}", config.network.server_address),
            )
        })
}

/// How long `exit` waits for the game thread.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);
