//! Rooms - one owner task per room
//!
//! A room's membership lives inside its task and is only touched by the
//! commands that task receives, one at a time. Joins, leaves and broadcasts
//! to the same room are therefore applied in a single order, and every
//! `players_count` sent out is the size of the membership at that point.
//!
//! ```text
//! RoomRegistry ── RoomHandle ──mpsc──▶ room task ──send──▶ member connections
//!                              ◀─oneshot── replies
//! ```

use crate::error::{Error, Result};
use growroom_core::{ConnectionId, PlayerId, RoomId};
use growroom_net::{Connection, ServerMessage};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

struct Member {
    player: PlayerId,
    conn: Arc<dyn Connection>,
}

enum RoomCommand {
    Join {
        player: PlayerId,
        conn: Arc<dyn Connection>,
        reply: oneshot::Sender<growroom_core::Result<usize>>,
    },
    Leave {
        conn: ConnectionId,
        reply: oneshot::Sender<Option<usize>>,
    },
    Broadcast {
        message: ServerMessage,
        except: Option<ConnectionId>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    /// Stop the task if nobody is in the room
    CloseIfEmpty {
        reply: oneshot::Sender<bool>,
    },
}

/// Cheap, cloneable address of a running room task
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    fn spawn(id: RoomId, capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_room(id.clone(), capacity, rx));
        Self { id, tx }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    fn same_room_task(&self, other: &RoomHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    fn command(&self, command: RoomCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::RoomClosed(self.id.clone()))
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.command(make(reply))?;
        rx.await.map_err(|_| Error::RoomClosed(self.id.clone()))
    }

    /// Add a member; returns the new count
    pub async fn join(&self, player: PlayerId, conn: Arc<dyn Connection>) -> Result<usize> {
        Ok(self
            .ask(|reply| RoomCommand::Join {
                player,
                conn,
                reply,
            })
            .await??)
    }

    /// Remove a member; `None` if they were not in the room
    pub async fn leave(&self, conn: ConnectionId) -> Result<Option<usize>> {
        self.ask(|reply| RoomCommand::Leave { conn, reply }).await
    }

    /// Fire-and-forget delivery to every member except `except`
    pub fn broadcast(&self, message: ServerMessage, except: Option<ConnectionId>) -> Result<()> {
        self.command(RoomCommand::Broadcast { message, except })
    }

    pub async fn count(&self) -> Result<usize> {
        self.ask(|reply| RoomCommand::Count { reply }).await
    }

    async fn close_if_empty(&self) -> Result<bool> {
        self.ask(|reply| RoomCommand::CloseIfEmpty { reply }).await
    }
}

fn deliver(room: &RoomId, member: &Member, message: ServerMessage) {
    if let Err(e) = member.conn.send(message) {
        debug!(room = %room, player = %member.player, error = %e, "dropped room message");
    }
}

async fn run_room(id: RoomId, capacity: usize, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
    let mut members: IndexMap<ConnectionId, Member> = IndexMap::new();
    debug!(room = %id, "room opened");

    while let Some(command) = rx.recv().await {
        match command {
            RoomCommand::Join {
                player,
                conn,
                reply,
            } => {
                let conn_id = conn.id();
                if !members.contains_key(&conn_id) && members.len() >= capacity {
                    let _ = reply.send(Err(growroom_core::Error::Capacity {
                        room: id.to_string(),
                        capacity,
                    }));
                    continue;
                }
                let is_new = members
                    .insert(conn_id, Member { player, conn })
                    .is_none();
                let count = members.len();
                if let Some(joiner) = members.get(&conn_id) {
                    deliver(
                        &id,
                        joiner,
                        ServerMessage::RoomJoined {
                            room_id: id.clone(),
                            players_count: count,
                        },
                    );
                }
                if is_new {
                    info!(room = %id, player = %player, players = count, "player joined");
                    for (other, member) in &members {
                        if *other != conn_id {
                            deliver(
                                &id,
                                member,
                                ServerMessage::PlayerJoined {
                                    room_id: id.clone(),
                                    player_id: player,
                                    players_count: count,
                                },
                            );
                        }
                    }
                }
                let _ = reply.send(Ok(count));
            }
            RoomCommand::Leave { conn, reply } => {
                let left = members.shift_remove(&conn);
                let count = members.len();
                if let Some(left) = &left {
                    info!(room = %id, player = %left.player, players = count, "player left");
                    for member in members.values() {
                        deliver(
                            &id,
                            member,
                            ServerMessage::PlayerLeft {
                                room_id: id.clone(),
                                player_id: left.player,
                                players_count: count,
                            },
                        );
                    }
                }
                let _ = reply.send(left.map(|_| count));
            }
            RoomCommand::Broadcast { message, except } => {
                for (conn_id, member) in &members {
                    if Some(*conn_id) != except {
                        deliver(&id, member, message.clone());
                    }
                }
            }
            RoomCommand::Count { reply } => {
                let _ = reply.send(members.len());
            }
            RoomCommand::CloseIfEmpty { reply } => {
                let empty = members.is_empty();
                let _ = reply.send(empty);
                if empty {
                    break;
                }
            }
        }
    }
    debug!(room = %id, "room closed");
}

/// Room key → running room task
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, RoomHandle>>,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get_or_open(&self, id: &RoomId) -> RoomHandle {
        self.table()
            .entry(id.clone())
            .or_insert_with(|| RoomHandle::spawn(id.clone(), self.capacity))
            .clone()
    }

    fn forget(&self, handle: &RoomHandle) {
        let mut table = self.table();
        if table
            .get(handle.id())
            .is_some_and(|current| current.same_room_task(handle))
        {
            table.remove(handle.id());
        }
    }

    pub fn get(&self, id: &RoomId) -> Option<RoomHandle> {
        self.table().get(id).cloned()
    }

    /// Join a room, opening it if needed; returns the new member count
    ///
    /// A room that closed between lookup and join is replaced by a fresh one.
    pub async fn join(
        &self,
        id: &RoomId,
        player: PlayerId,
        conn: Arc<dyn Connection>,
    ) -> Result<usize> {
        let mut attempts = 0;
        loop {
            let handle = self.get_or_open(id);
            match handle.join(player, conn.clone()).await {
                Err(Error::RoomClosed(_)) if attempts < 2 => {
                    attempts += 1;
                    self.forget(&handle);
                }
                other => return other,
            }
        }
    }

    /// Leave a room; closes it when the last member goes
    pub async fn leave(&self, id: &RoomId, conn: ConnectionId) -> Result<Option<usize>> {
        let Some(handle) = self.get(id) else {
            return Ok(None);
        };
        let count = match handle.leave(conn).await {
            Ok(count) => count,
            Err(Error::RoomClosed(_)) => {
                self.forget(&handle);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if count == Some(0) && handle.close_if_empty().await.unwrap_or(true) {
            self.forget(&handle);
        }
        Ok(count)
    }

    pub fn broadcast(&self, id: &RoomId, message: ServerMessage, except: Option<ConnectionId>) {
        if let Some(handle) = self.get(id) {
            if handle.broadcast(message, except).is_err() {
                warn!(room = %id, "broadcast to closed room");
                self.forget(&handle);
            }
        }
    }

    /// Deliver to every open room
    pub fn broadcast_all(&self, message: ServerMessage) {
        let handles: Vec<RoomHandle> = self.table().values().cloned().collect();
        for handle in handles {
            if handle.broadcast(message.clone(), None).is_err() {
                self.forget(&handle);
            }
        }
    }

    pub async fn count(&self, id: &RoomId) -> usize {
        match self.get(id) {
            Some(handle) => handle.count().await.unwrap_or(0),
            None => 0,
        }
    }

    pub fn room_count(&self) -> usize {
        self.table().len()
    }
}
