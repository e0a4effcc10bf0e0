//! Per-role configuration and log directories.
//!
//! Everything lives under the OS configuration directory (XDG on Linux,
//! Known Folders on Windows, Library on macOS) in
//! `Tile Fortress/<Server|Client>`.

use std::io;
use std::path::{Path, PathBuf};

use tilefort_config::Role;

const APP_NAME: &str = "Tile Fortress";

/// Failure to locate or create the platform directories.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The OS did not provide a configuration directory.
    #[error("could not determine OS configuration directory")]
    NoConfigDir,

    #[error("platform I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Directories used by one binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    /// Holds `config.ron`.
    pub config_dir: PathBuf,
    /// Holds the JSON log of debug builds.
    pub log_dir: PathBuf,
}

fn role_dir(role: Role) -> &'static str {
    match role {
        Role::Server => "Server",
        Role::Client => "Client",
    }
}

impl PlatformDirs {
    /// Resolves the directories of `role` without creating them.
    pub fn resolve(role: Role) -> Result<Self, PlatformError> {
        let base = dirs::config_dir().ok_or(PlatformError::NoConfigDir)?;
        Ok(Self::resolve_with_root(&base, role))
    }

    /// Resolves the directories of `role` under a custom root.
    pub fn resolve_with_root(root: &Path, role: Role) -> Self {
        let app_dir = root.join(APP_NAME).join(role_dir(role));
        Self {
            config_dir: app_dir.clone(),
            log_dir: app_dir.join("logs"),
        }
    }

    /// Uses `config_dir` as given, with logs beneath it.
    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        let log_dir = config_dir.join("logs");
        Self {
            config_dir,
            log_dir,
        }
    }

    /// Creates every directory on disk.
    pub fn create_dirs(&self) -> Result<(), PlatformError> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
