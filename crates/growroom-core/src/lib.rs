//! Growroom Core - simulation and economy rules for the grow game
//!
//! Everything in this crate is pure logic: no I/O, no global state, no
//! ambient randomness. Callers pass in the records, the current time and a
//! [`GameRng`], and get back new records or typed outcomes.
//!
//! - [`genetics`] - base strain generation and crossbreeding
//! - [`weather`] - timed weather effects and their growth impact
//! - [`market`] - supply/demand driven price modifiers and market events
//! - [`growth`] - advancing a plant through its growth stages
//! - [`trade`] - two-party trade offers with a TTL
//!
//! ## Determinism
//!
//! With the same seed, clock and inputs every operation produces the same
//! result, which is what the tests rely on.

mod error;
pub mod genetics;
pub mod growth;
mod identity;
pub mod market;
pub mod player;
mod rng;
pub mod time;
pub mod trade;
pub mod weather;

pub use error::{Error, Result, GENERIC_FAILURE};
pub use genetics::{BreedOutcome, Breeder, BreedingReward, Genetics, GrowthPattern, Rarity};
pub use growth::{Environment, GrowthReport, GrowthStage, Plant, PlantStatus};
pub use identity::{
    ConnectionId, GeneticsId, LocationId, MarketEventId, PlantId, PlayerId, RoomId, TradeId,
    WeatherEffectId,
};
pub use market::{GrowingLocation, MarketCondition, MarketEvent, PricePoint};
pub use player::Player;
pub use rng::GameRng;
pub use time::{Clock, ManualClock, Season, SystemClock};
pub use trade::{TradeItem, TradeItems, TradeOffer, TradeStatus};
pub use weather::{Severity, WeatherEffect, WeatherImpact, WeatherKind};
