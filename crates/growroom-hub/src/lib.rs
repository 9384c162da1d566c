//! Growroom Hub - multiplayer coordinator for the grow simulation
//!
//! This crate connects the pure rules in `growroom-core` and the store in
//! `growroom-db` to live players.
//!
//! ## Architecture
//!
//! ```text
//! Coordinator
//!  │
//!  ├── SessionRegistry   connection ↔ player, per-connection state machine
//!  ├── RoomRegistry      one owner task per room (mpsc in, oneshot out)
//!  ├── TradeBook         open two-party offers with a TTL
//!  ├── GameService       breeding, planting, plant care, sales, sharing
//!  ├── MarketEngine      hourly market tick + cached snapshot
//!  ├── WeatherEngine     weather cycle + cached snapshot
//!  └── EventBus          domain events for an external notifier
//! ```
//!
//! Every component is built from one [`SimContext`] holding the store, the
//! clock, the random source and the configuration. Nothing is global.
//!
//! ## Concurrency
//!
//! - Room membership is only touched by the room's own task, so joins,
//!   leaves and broadcasts to one room are linearizable.
//! - Mutations of one plant, one parent pair or one trade are serialised by
//!   [`EntityLocks`].
//! - Market, weather, heartbeat and trade-expiry jobs each run on their own
//!   interval and never wait on client I/O.

pub mod auth;
pub mod config;
mod context;
mod coordinator;
mod error;
pub mod events;
mod locks;
mod market;
mod room;
pub mod scheduler;
mod services;
mod session;
mod trades;
mod weather;

pub use auth::{Authenticator, StaticTokens, TokenEntry};
pub use config::{CoordinatorConfig, RetryPolicy};
pub use context::SimContext;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use events::{DomainEvent, EventBus};
pub use locks::{EntityLocks, LockKey};
pub use market::{MarketEngine, MAX_HISTORY_DAYS};
pub use room::{RoomHandle, RoomRegistry};
pub use services::{Bred, GameService, PlantActionOutcome, Sale};
pub use session::{Session, SessionRegistry, SessionState};
pub use trades::TradeBook;
pub use weather::{WeatherEngine, FORECAST_HOURS};
