/// Failure while reading or writing `config.ron`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[source] std::io::Error),

    /// Failed to write the config file or create its directory.
    #[error("cannot write config file: {0}")]
    Write(#[source] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[source] ron::error::SpannedError),

    #[error("cannot encode config: {0}")]
    Serialize(#[source] ron::Error),
}
