//! Error types for growroom-hub
//!
//! Game rule failures arrive as [`growroom_core::Error`]; the variants added
//! here are coordinator states a client can be in when it sends something it
//! may not send yet.

use growroom_core::RoomId;
use thiserror::Error;

/// Result type for growroom-hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in growroom-hub
#[derive(Debug, Error)]
pub enum Error {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The action needs room membership
    #[error("Join a room first")]
    NotInRoom,

    #[error("Not a member of room {0}")]
    WrongRoom(RoomId),

    /// The room's owner task is gone; callers retry on a fresh room
    #[error("Room {0} closed")]
    RoomClosed(RoomId),

    #[error("Unknown connection {0}")]
    UnknownConnection(growroom_core::ConnectionId),

    /// Domain error
    #[error(transparent)]
    Core(#[from] growroom_core::Error),

    /// Wire error
    #[error(transparent)]
    Net(#[from] growroom_net::Error),
}

impl From<growroom_db::Error> for Error {
    fn from(err: growroom_db::Error) -> Self {
        Error::Core(err.into())
    }
}

impl Error {
    /// Text sent to the client that caused the error
    pub fn client_message(&self) -> String {
        match self {
            Error::Core(inner) => inner.client_message(),
            Error::Net(growroom_net::Error::Serialization(msg)) => {
                format!("Malformed message: {}", msg)
            }
            Error::Net(_) | Error::RoomClosed(_) => growroom_core::GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Error::Core(inner) => inner.is_transient(),
            Error::RoomClosed(_) => true,
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Core(growroom_core::Error::ConcurrencyConflict(_))
        )
    }

    pub fn is_ownership(&self) -> bool {
        matches!(self, Error::Core(growroom_core::Error::Ownership { .. }))
    }
}

// Errors cross task boundaries through oneshot replies.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        let err: Error = growroom_db::Error::Database("redb: io".into()).into();
        assert_eq!(err.client_message(), growroom_core::GENERIC_FAILURE);
        assert!(err.is_transient());

        let err: Error = growroom_core::Error::ownership("plant", "plant:1", "player:2").into();
        assert!(err.is_ownership());
        assert_eq!(err.client_message(), "plant plant:1 is not owned by player:2");

        assert_eq!(Error::NotInRoom.client_message(), "Join a room first");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err: Error = growroom_db::Error::Conflict("plant:1".into()).into();
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }
}
