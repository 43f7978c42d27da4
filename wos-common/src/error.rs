//! Common error types for WOS

use thiserror::Error;

/// Common result type for WOS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across WOS components
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, illegal path, unparsable field, unknown object kind
    #[error("Validation error: {0}")]
    Validation(String),

    /// Requested resource not found (CID, session token)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A pinned arc's arc selector matched no stored arc
    #[error("Arc not found: {0}")]
    ArcNotFound(String),

    /// A pinned arc's pin selector matched no stored pin
    #[error("Pin not found: {0}")]
    PinNotFound(String),

    /// Staging directory creation failure, disk exhaustion
    #[error("Resource error: {0}")]
    Resource(String),

    /// Content store, blob mirror or index write failure
    #[error("Store error: {0}")]
    Store(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// True for every "referenced entity does not exist" error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::ArcNotFound(_) | Error::PinNotFound(_)
        )
    }
}
