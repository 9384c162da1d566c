//! Connection ↔ identity registry
//!
//! Each connection moves through
//! `Unauthenticated → Authenticated → InRoom ⇄ Authenticated` and is removed
//! on disconnect or heartbeat timeout.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use growroom_core::{ConnectionId, PlayerId, RoomId};
use growroom_net::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { player: PlayerId },
    InRoom { player: PlayerId, room: RoomId },
}

impl SessionState {
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            SessionState::Unauthenticated => None,
            SessionState::Authenticated { player } | SessionState::InRoom { player, .. } => {
                Some(*player)
            }
        }
    }

    pub fn room(&self) -> Option<&RoomId> {
        match self {
            SessionState::InRoom { room, .. } => Some(room),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Session {
    pub conn: Arc<dyn Connection>,
    pub state: SessionState,
    pub last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    /// Most recent authenticated connection of each player
    by_player: HashMap<PlayerId, ConnectionId>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Registry>,
}

impl SessionRegistry {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, conn: Arc<dyn Connection>, now: DateTime<Utc>) {
        self.registry().sessions.insert(
            conn.id(),
            Session {
                conn,
                state: SessionState::Unauthenticated,
                last_seen: now,
            },
        );
    }

    pub fn get(&self, id: ConnectionId) -> Result<Session> {
        self.registry()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownConnection(id))
    }

    pub fn touch(&self, id: ConnectionId, now: DateTime<Utc>) {
        if let Some(session) = self.registry().sessions.get_mut(&id) {
            session.last_seen = now;
        }
    }

    pub fn authenticate(&self, id: ConnectionId, player: PlayerId) -> Result<()> {
        let mut registry = self.registry();
        let session = registry
            .sessions
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        if session.state != SessionState::Unauthenticated {
            return Err(Error::AlreadyAuthenticated);
        }
        session.state = SessionState::Authenticated { player };
        registry.by_player.insert(player, id);
        Ok(())
    }

    /// The authenticated player behind a connection
    pub fn player(&self, id: ConnectionId) -> Result<PlayerId> {
        self.get(id)?.state.player().ok_or(Error::NotAuthenticated)
    }

    /// The player and the room they are in
    pub fn membership(&self, id: ConnectionId) -> Result<(PlayerId, RoomId)> {
        match self.get(id)?.state {
            SessionState::InRoom { player, room } => Ok((player, room)),
            SessionState::Authenticated { .. } => Err(Error::NotInRoom),
            SessionState::Unauthenticated => Err(Error::NotAuthenticated),
        }
    }

    pub fn enter_room(&self, id: ConnectionId, room: RoomId) -> Result<()> {
        let mut registry = self.registry();
        let session = registry
            .sessions
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        let player = session.state.player().ok_or(Error::NotAuthenticated)?;
        session.state = SessionState::InRoom { player, room };
        Ok(())
    }

    pub fn exit_room(&self, id: ConnectionId) {
        if let Some(session) = self.registry().sessions.get_mut(&id) {
            if let SessionState::InRoom { player, .. } = session.state {
                session.state = SessionState::Authenticated { player };
            }
        }
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Session> {
        let mut registry = self.registry();
        let session = registry.sessions.remove(&id)?;
        if let Some(player) = session.state.player() {
            if registry.by_player.get(&player) == Some(&id) {
                registry.by_player.remove(&player);
            }
        }
        Some(session)
    }

    /// Live connection of an online player
    pub fn connection_for(&self, player: PlayerId) -> Option<Arc<dyn Connection>> {
        let registry = self.registry();
        let id = registry.by_player.get(&player)?;
        registry.sessions.get(id).map(|s| s.conn.clone())
    }

    pub fn is_online(&self, player: PlayerId) -> bool {
        self.connection_for(player).is_some()
    }

    /// Connections silent for longer than `timeout`
    pub fn stale(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<ConnectionId> {
        self.registry()
            .sessions
            .iter()
            .filter(|(_, s)| now - s.last_seen > timeout)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn connections(&self) -> Vec<Arc<dyn Connection>> {
        self.registry()
            .sessions
            .values()
            .map(|s| s.conn.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use growroom_net::ChannelConnection;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn registered(id: u64) -> (SessionRegistry, ConnectionId) {
        let sessions = SessionRegistry::default();
        let (conn, _rx) = ChannelConnection::new(ConnectionId(id), None);
        sessions.register(Arc::new(conn), now());
        (sessions, ConnectionId(id))
    }

    #[test]
    fn test_state_machine() {
        let (sessions, id) = registered(1);
        assert!(matches!(sessions.player(id), Err(Error::NotAuthenticated)));
        assert!(matches!(
            sessions.enter_room(id, RoomId::new("global")),
            Err(Error::NotAuthenticated)
        ));

        sessions.authenticate(id, PlayerId(7)).unwrap();
        assert!(matches!(
            sessions.authenticate(id, PlayerId(7)),
            Err(Error::AlreadyAuthenticated)
        ));
        assert!(matches!(sessions.membership(id), Err(Error::NotInRoom)));

        sessions.enter_room(id, RoomId::new("global")).unwrap();
        assert_eq!(
            sessions.membership(id).unwrap(),
            (PlayerId(7), RoomId::new("global"))
        );
        sessions.exit_room(id);
        assert_eq!(sessions.player(id).unwrap(), PlayerId(7));
        assert!(sessions.is_online(PlayerId(7)));

        sessions.remove(id);
        assert!(!sessions.is_online(PlayerId(7)));
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_stale_connections() {
        let (sessions, id) = registered(1);
        assert!(sessions.stale(now() + Duration::seconds(90), Duration::seconds(90)).is_empty());
        assert_eq!(
            sessions.stale(now() + Duration::seconds(91), Duration::seconds(90)),
            vec![id]
        );
        sessions.touch(id, now() + Duration::seconds(60));
        assert!(sessions.stale(now() + Duration::seconds(91), Duration::seconds(90)).is_empty());
    }
}
