use std::io;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ShepherdError {
    /// Missing binaries/artifacts, bad option values, unreadable config files
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server could not be launched, or died before becoming reachable
    #[error("Startup failure: {0}")]
    Startup(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Signal handling error: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, ShepherdError>;

impl ShepherdError {
    pub fn config(msg: impl Into<String>) -> Self {
        ShepherdError::Config(msg.into())
    }

    pub fn startup(msg: impl Into<String>) -> Self {
        ShepherdError::Startup(msg.into())
    }
}

impl From<io::Error> for ShepherdError {
    fn from(e: io::Error) -> Self {
        ShepherdError::Io(e.to_string())
    }
}

impl From<serde_yaml::Error> for ShepherdError {
    fn from(e: serde_yaml::Error) -> Self {
        ShepherdError::Yaml(e.to_string())
    }
}

impl From<ctrlc::Error> for ShepherdError {
    fn from(e: ctrlc::Error) -> Self {
        ShepherdError::Signal(e.to_string())
    }
}
