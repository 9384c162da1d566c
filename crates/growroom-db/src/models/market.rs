//! Market state and the price-history ledger.

use super::{decode, encode};
use crate::error::Result;
use growroom_core::{GeneticsId, LocationId, MarketCondition, MarketEvent, PricePoint};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Current condition of one (location, strain) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 20, version = 1)]
#[native_db]
pub struct StoredMarketCondition {
    /// "location:strain"
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub strain_id: u64,
    /// Serialized [`MarketCondition`].
    pub data: Vec<u8>,
}

impl StoredMarketCondition {
    pub fn key(location: LocationId, strain: GeneticsId) -> String {
        format!("{}:{}", location.raw(), strain.raw())
    }

    pub fn from_condition(condition: &MarketCondition) -> Result<Self> {
        Ok(Self {
            key: Self::key(condition.location, condition.strain),
            strain_id: condition.strain.raw(),
            data: encode(condition)?,
        })
    }

    pub fn to_condition(&self) -> Result<MarketCondition> {
        decode(&self.data)
    }
}

/// Price-history entries are only ever inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 21, version = 1)]
#[native_db]
pub struct StoredPricePoint {
    #[primary_key]
    pub seq: u64,
    #[secondary_key]
    pub strain_id: u64,
    pub data: Vec<u8>,
}

impl StoredPricePoint {
    pub fn from_point(seq: u64, point: &PricePoint) -> Result<Self> {
        Ok(Self {
            seq,
            strain_id: point.strain.raw(),
            data: encode(point)?,
        })
    }

    pub fn to_point(&self) -> Result<PricePoint> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 22, version = 1)]
#[native_db]
pub struct StoredMarketEvent {
    #[primary_key]
    pub id: u64,
    pub data: Vec<u8>,
}

impl StoredMarketEvent {
    pub fn from_event(event: &MarketEvent) -> Result<Self> {
        Ok(Self {
            id: event.id.raw(),
            data: encode(event)?,
        })
    }

    pub fn to_event(&self) -> Result<MarketEvent> {
        decode(&self.data)
    }
}
