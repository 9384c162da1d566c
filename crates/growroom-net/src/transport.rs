//! Connection seam between the coordinator and the byte transport
//!
//! The coordinator only ever sees `dyn Connection`. A transport (TCP here,
//! anything line-oriented in principle) owns the socket and drains the
//! outbound side.

use crate::error::{Error, Result};
use crate::protocol::ServerMessage;
use growroom_core::ConnectionId;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Network address type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// Socket address (IP + port)
    Socket(SocketAddr),
    /// Anything else (test harnesses, proxied peers)
    Custom(String),
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Address::Custom(addr.to_string())
    }
}

/// A live peer the coordinator can push messages to
///
/// `send` must not block: delivery is fire-and-forget and a slow or dead
/// peer must never hold up a broadcast to the others.
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Queue a message for delivery
    fn send(&self, message: ServerMessage) -> Result<()>;

    /// Check if the connection is still alive
    fn is_connected(&self) -> bool;

    /// Get the remote address
    fn remote_addr(&self) -> Option<Address>;

    /// Ask the transport to hang up once queued messages are flushed
    fn close(&self);
}

/// What the transport's writer task receives
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

/// [`Connection`] backed by an unbounded channel to a writer task
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    addr: Option<Address>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelConnection {
    pub fn new(
        id: ConnectionId,
        addr: Option<Address>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, addr, tx }, rx)
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: ServerMessage) -> Result<()> {
        self.tx
            .send(Outbound::Message(message))
            .map_err(|_| Error::Closed)
    }

    fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn remote_addr(&self) -> Option<Address> {
        self.addr.clone()
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}
