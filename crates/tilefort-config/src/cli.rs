//! Command-line overrides shared by both binaries.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Options that override values loaded from `config.ron`.
///
/// Binaries flatten this into their own parser.
#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    /// Server address to connect to or bind.
    #[arg(long)]
    pub server: Option<String>,

    /// Server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Minimum log level, such as `debug` or `warn`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory holding `config.ron`, instead of the per-user default.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Chunk requests answered per server tick.
    #[arg(long)]
    pub requests_per_tick: Option<usize>,

    /// Updates per second of this process.
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// Radius in chunks the client keeps loaded.
    #[arg(long)]
    pub draw_distance: Option<i32>,
}

/// Which binary the overrides are applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Config {
    /// Apply CLI overrides to a loaded config. `--tick-rate` targets the
    /// rate of `role`.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs, role: Role) {
        if let Some(address) = &args.server {
            self.network.server_address.clone_from(address);
        }
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(level) = &args.log_level {
            self.debug.log_level.clone_from(level);
        }
        if let Some(n) = args.requests_per_tick {
            self.sync.requests_per_tick = n;
        }
        if let Some(rate) = args.tick_rate {
            match role {
                Role::Server => self.tick.server_rate = rate,
                Role::Client => self.tick.client_rate = rate,
            }
        }
        if let Some(distance) = args.draw_distance {
            self.client.draw_distance = distance;
        }
    }
}
