//! Error taxonomy shared by every growroom crate

use thiserror::Error;

/// Text sent to a client in place of infrastructure details
pub const GENERIC_FAILURE: &str = "Server error occurred";

/// Core error type
///
/// Random game outcomes such as a failed breeding roll are not errors and
/// never appear here; they are reported through the operation's result type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed action or missing field; nothing was changed
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{entity} {id} is not owned by {player}")]
    Ownership {
        entity: &'static str,
        id: String,
        player: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    /// Two mutations on the same record raced; the loser may retry once
    #[error("Concurrent modification of {0}")]
    ConcurrencyConflict(String),

    #[error("Room {room} is full ({capacity} players)")]
    Capacity { room: String, capacity: usize },

    /// Store or scheduler unavailable
    #[error("Infrastructure unavailable: {0}")]
    TransientInfrastructure(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Error::NotFound(what.to_string())
    }

    pub fn ownership(
        entity: &'static str,
        id: impl std::fmt::Display,
        player: impl std::fmt::Display,
    ) -> Self {
        Error::Ownership {
            entity,
            id: id.to_string(),
            player: player.to_string(),
        }
    }

    /// Whether a scheduler should retry the failed operation with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientInfrastructure(_))
    }

    /// Message safe to show to a client
    pub fn client_message(&self) -> String {
        match self {
            Error::TransientInfrastructure(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
