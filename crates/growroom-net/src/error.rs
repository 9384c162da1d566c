//! Error types for growroom-net

use thiserror::Error;

/// Wire error type
#[derive(Debug, Error)]
pub enum Error {
    /// The peer is gone; nothing more can be sent
    #[error("Connection closed")]
    Closed,

    /// A single line exceeded the frame limit
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, Error>;
