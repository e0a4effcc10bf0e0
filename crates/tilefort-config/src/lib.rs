//! Configuration for Tile Fortress.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Missing sections and fields fall back to their defaults, and
//! unknown fields are ignored.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, Role};
pub use config::{
    ClientConfig, Config, DebugConfig, NetworkConfig, SyncConfig, TickConfig, WorldConfig,
};
pub use error::ConfigError;
