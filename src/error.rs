//! Error types for the flightsearch host.

use flightsearch_core::SearchError;

/// Top-level error type for the host process.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the coordination core.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// HTTP server error.
    #[error("server error: {0}")]
    Server(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AppError>;
