//! Application-wide error types.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Startup errors. Nothing inside a poll cycle produces one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing bootstrap material: {path} not found")]
    MissingBootstrap { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Configuration error for a variable that failed to parse.
    pub fn invalid_var(name: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::Configuration(format!("{}={:?} is invalid: {}", name, value, reason))
    }
}
