//! Inbound actions and outbound broadcasts

use chrono::{DateTime, Utc};
use growroom_core::growth::Inspection;
use growroom_core::market::PriceTrend;
use growroom_core::{
    Genetics, GeneticsId, LocationId, MarketCondition, MarketEvent, Plant, PlantId, PlayerId,
    PricePoint, Rarity, RoomId, TradeId, TradeItems, TradeOffer, TradeStatus, WeatherEffect,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantActionKind {
    Water,
    Fertilize,
    /// Grow the plant for the real time elapsed since it was last touched
    Advance,
    Harvest,
}

impl fmt::Display for PlantActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlantActionKind::Water => "water",
            PlantActionKind::Fertilize => "fertilize",
            PlantActionKind::Advance => "advance",
            PlantActionKind::Harvest => "harvest",
        };
        write!(f, "{}", name)
    }
}

/// Everything a client may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        token: String,
    },
    JoinRoom {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    PlantAction {
        action: PlantActionKind,
        plant_id: PlantId,
    },
    PlantSeed {
        genetics_id: GeneticsId,
        location_id: LocationId,
    },
    SellHarvest {
        plant_id: PlantId,
    },
    TradeRequest {
        target_id: PlayerId,
        items: TradeItems,
    },
    TradeResponse {
        trade_id: TradeId,
        accept: bool,
    },
    TradeCancel {
        trade_id: TradeId,
    },
    ShareGenetics {
        genetics_id: GeneticsId,
    },
    MarketUpdateRequest,
    WeatherSyncRequest,
    BreedRequest {
        parent1_id: GeneticsId,
        parent2_id: GeneticsId,
    },
    /// Look at one of your plants without advancing it
    PlantStatusRequest {
        plant_id: PlantId,
    },
    PriceHistoryRequest {
        genetics_id: GeneticsId,
        /// All locations when absent
        #[serde(default)]
        location_id: Option<LocationId>,
        /// Window to look back over, 1 to 30 days
        days: u32,
    },
    BreedingHistoryRequest,
    Pong,
}

impl ClientMessage {
    /// The wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Auth { .. } => "auth",
            ClientMessage::JoinRoom { .. } => "join_room",
            ClientMessage::LeaveRoom { .. } => "leave_room",
            ClientMessage::PlantAction { .. } => "plant_action",
            ClientMessage::PlantSeed { .. } => "plant_seed",
            ClientMessage::SellHarvest { .. } => "sell_harvest",
            ClientMessage::TradeRequest { .. } => "trade_request",
            ClientMessage::TradeResponse { .. } => "trade_response",
            ClientMessage::TradeCancel { .. } => "trade_cancel",
            ClientMessage::ShareGenetics { .. } => "share_genetics",
            ClientMessage::MarketUpdateRequest => "market_update_request",
            ClientMessage::WeatherSyncRequest => "weather_sync_request",
            ClientMessage::BreedRequest { .. } => "breed_request",
            ClientMessage::PlantStatusRequest { .. } => "plant_status_request",
            ClientMessage::PriceHistoryRequest { .. } => "price_history_request",
            ClientMessage::BreedingHistoryRequest => "breeding_history_request",
            ClientMessage::Pong => "pong",
        }
    }
}

/// Market state as of the last tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub conditions: Vec<MarketCondition>,
    pub events: Vec<MarketEvent>,
    /// 0-100 overall activity score
    pub health: f64,
    pub updated_at: DateTime<Utc>,
}

/// Weather as of the last tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub active: Vec<WeatherEffect>,
    /// Effects in force at some point in the next 24 hours
    pub forecast: Vec<WeatherEffect>,
    pub updated_at: DateTime<Utc>,
}

/// One breeding attempt as the breeder sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingAttempt {
    pub parent1_id: GeneticsId,
    pub parent2_id: GeneticsId,
    /// None when the roll missed
    pub offspring_id: Option<GeneticsId>,
    pub rarity: Option<Rarity>,
    pub success_probability: f64,
    pub at: DateTime<Utc>,
}

/// Everything the coordinator may send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Authenticated {
        player_id: PlayerId,
        name: String,
        level: u32,
        lab_level: u32,
        tokens: u64,
    },
    RoomJoined {
        room_id: RoomId,
        players_count: usize,
    },
    RoomLeft {
        room_id: RoomId,
    },
    PlayerJoined {
        room_id: RoomId,
        player_id: PlayerId,
        players_count: usize,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: PlayerId,
        players_count: usize,
    },
    PlantActionResult {
        player_id: PlayerId,
        action: PlantActionKind,
        plant: Plant,
        growth_gained: Option<f64>,
        harvest_weight: Option<f64>,
        recommendations: Vec<String>,
    },
    PlantSeeded {
        player_id: PlayerId,
        plant: Plant,
    },
    /// Delivered to the target only
    TradeRequest {
        trade: TradeOffer,
    },
    /// Delivered to the initiator only
    TradeRequestSent {
        trade: TradeOffer,
    },
    TradeResolved {
        trade_id: TradeId,
        status: TradeStatus,
    },
    TradeExpired {
        trade_id: TradeId,
    },
    MarketPricesUpdate(MarketSnapshot),
    WeatherUpdate(WeatherSnapshot),
    GeneticsBred {
        player_id: PlayerId,
        genetics: Genetics,
        success_probability: f64,
    },
    /// A breeding roll that missed; sent to the breeder only
    BreedFailed {
        parent1_id: GeneticsId,
        parent2_id: GeneticsId,
        success_probability: f64,
        roll: f64,
    },
    GeneticsShared {
        player_id: PlayerId,
        genetics: Genetics,
    },
    SaleCompleted {
        plant_id: PlantId,
        price: u64,
        tokens: u64,
    },
    PlantStatus {
        plant: Plant,
        inspection: Inspection,
    },
    PriceHistory {
        genetics_id: GeneticsId,
        location_id: Option<LocationId>,
        points: Vec<PricePoint>,
        /// None without any recorded prices in the window
        trend: Option<PriceTrend>,
    },
    BreedingHistory {
        lab_level: u32,
        strains_bred: u32,
        attempts: Vec<BreedingAttempt>,
    },
    Ping {
        timestamp: i64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
