//! Error types for the data loader

use thiserror::Error;

/// Error type for the data loader
#[derive(Error, Debug)]
pub enum Error {
    /// Error raised by a pipeline stage, collation or the data model
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] ml_bridge_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Configuration parsed but is not usable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Logging could not be initialized
    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    /// The pipeline error behind this error, if any
    pub fn pipeline(&self) -> Option<&ml_bridge_core::Error> {
        match self {
            Error::Pipeline(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for the data loader
pub type Result<T> = std::result::Result<T, Error>;
