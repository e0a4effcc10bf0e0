//! Translates the loaded configuration into runtime settings.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use tilefort_config::Config;
use tilefort_net::{FrameConfig, TcpConfig};
use tilefort_sync::ClientSettings;
use tilefort_world::WorldSettings;

/// TCP transport settings for connecting to the server.
pub fn tcp_config(config: &Config) -> TcpConfig {
    TcpConfig {
        app_id: config.network.app_id.clone(),
        handshake_timeout: config.network.timeout(),
        frame: FrameConfig {
            max_payload_size: config.network.max_payload_bytes,
        },
        ..TcpConfig::default()
    }
}

/// Session settings from the `sync`, `network` and `world` sections.
pub fn client_settings(config: &Config) -> ClientSettings {
    ClientSettings {
        chunk_retry: config.sync.chunk_retry(),
        shutdown_timeout: config.network.timeout(),
        world: WorldSettings {
            max_pending_ticks: config.world.max_pending_ticks,
        },
    }
}

/// Resolves the configured server host and port.
pub fn server_addr(config: &Config) -> io::Result<SocketAddr> {
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
