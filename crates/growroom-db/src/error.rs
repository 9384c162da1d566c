//! Error types for database operations.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Native DB error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A versioned write lost to a concurrent writer.
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A game rule rejected the change; the transaction was rolled back.
    #[error(transparent)]
    Rejected(#[from] growroom_core::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for growroom_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected(inner) => inner,
            Error::NotFound(what) => growroom_core::Error::NotFound(what),
            Error::Conflict(what) => growroom_core::Error::ConcurrencyConflict(what),
            Error::Database(msg) | Error::Serialization(msg) => {
                growroom_core::Error::TransientInfrastructure(msg)
            }
            Error::Io(io) => growroom_core::Error::TransientInfrastructure(io.to_string()),
        }
    }
}
