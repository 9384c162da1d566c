//! Growroom Net - the real-time wire protocol
//!
//! Clients and the coordinator exchange one JSON object per line. Every
//! object carries a `type` tag naming the action or broadcast:
//!
//! ```text
//! client                               coordinator
//!   │  {"type":"auth","token":"..."}        │
//!   │ ─────────────────────────────────────▶│
//!   │  {"type":"authenticated",...}         │
//!   │ ◀─────────────────────────────────────│
//!   │  {"type":"join_room","room_id":"g"}   │
//!   │ ─────────────────────────────────────▶│
//!   │  {"type":"room_joined",...}           │  (to the joiner)
//!   │ ◀─────────────────────────────────────│  player_joined to the rest
//! ```
//!
//! The [`Connection`] trait is the seam between the coordinator and whatever
//! carries the bytes; [`ChannelConnection`] hands outbound messages to a
//! writer task over a channel.

mod codec;
mod error;
mod protocol;
mod transport;

pub use codec::{decode_line, encode_line, MAX_FRAME_LEN};
pub use error::{Error, Result};
pub use protocol::{
    BreedingAttempt, ClientMessage, MarketSnapshot, PlantActionKind, ServerMessage,
    WeatherSnapshot,
};
pub use transport::{Address, ChannelConnection, Connection, Outbound};
