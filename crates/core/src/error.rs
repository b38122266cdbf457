//! Error types shared outside the GPU layer.

use thiserror::Error;

/// Errors raised by the window layer, configuration and file access.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or handle access failed
    #[error("Window error: {0}")]
    Window(String),

    /// A configuration value is out of range
    #[error("Config error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
