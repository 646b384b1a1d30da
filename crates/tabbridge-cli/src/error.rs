use std::io;
use std::path::PathBuf;

use tabbridge::{ClientError, ConfigError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot reach the tabbridge host at {}: {source} (is the browser running with the extension?)", path.display())]
    Connect { path: PathBuf, source: io::Error },

    #[error("{0}")]
    Request(#[from] ClientError),

    #[error("invalid arguments: {0}")]
    Arguments(String),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CliError {
    /// 1: the command failed; 2: bad usage or configuration; 3: no usable connection.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Arguments(_) => 2,
            Self::Connect { .. } => 3,
            Self::Request(e) if e.is_connection_failure() => 3,
            Self::Request(_) | Self::Output(_) => 1,
        }
    }
}
