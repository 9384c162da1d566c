//! Append-only records of what happened in the economy.

use chrono::{DateTime, Utc};
use growroom_core::{
    GeneticsId, LocationId, PlantId, PlayerId, Rarity, TradeId, TradeOffer,
};
use serde::{Deserialize, Serialize};

/// How a player came to own a strain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionSource {
    Starter,
    Bred,
    Traded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ownership {
    pub player: PlayerId,
    pub genetics: GeneticsId,
    pub source: AcquisitionSource,
    pub acquired_at: DateTime<Utc>,
}

/// One breeding attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedingRecord {
    pub id: u64,
    pub player: PlayerId,
    pub parent1: GeneticsId,
    pub parent2: GeneticsId,
    pub offspring: Option<GeneticsId>,
    pub rarity: Option<Rarity>,
    pub success_probability: f64,
    pub experience_gained: u64,
    pub tokens_gained: u64,
    pub created_at: DateTime<Utc>,
}

impl BreedingRecord {
    pub fn is_success(&self) -> bool {
        self.offspring.is_some()
    }
}

/// A settled trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: TradeId,
    pub offer: TradeOffer,
    pub settled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: u64,
    pub seller: PlayerId,
    pub plant: PlantId,
    pub strain: GeneticsId,
    pub location: LocationId,
    pub weight: f64,
    pub price: u64,
    pub sold_at: DateTime<Utc>,
}
