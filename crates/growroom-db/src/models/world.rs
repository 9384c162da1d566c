//! Plants, locations and weather.

use super::{decode, encode};
use crate::error::Result;
use growroom_core::{GrowingLocation, Plant, WeatherEffect};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 10, version = 1)]
#[native_db]
pub struct StoredPlant {
    #[primary_key]
    pub id: u64,
    #[secondary_key]
    pub owner_id: u64,
    pub version: u64,
    /// Serialized [`Plant`].
    pub data: Vec<u8>,
}

impl StoredPlant {
    pub fn from_plant(plant: &Plant) -> Result<Self> {
        Ok(Self {
            id: plant.id.raw(),
            owner_id: plant.owner.raw(),
            version: plant.version,
            data: encode(plant)?,
        })
    }

    pub fn to_plant(&self) -> Result<Plant> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 11, version = 1)]
#[native_db]
pub struct StoredLocation {
    #[primary_key]
    pub id: u64,
    pub data: Vec<u8>,
}

impl StoredLocation {
    pub fn from_location(location: &GrowingLocation) -> Result<Self> {
        Ok(Self {
            id: location.id.raw(),
            data: encode(location)?,
        })
    }

    pub fn to_location(&self) -> Result<GrowingLocation> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 12, version = 1)]
#[native_db]
pub struct StoredWeatherEffect {
    #[primary_key]
    pub id: u64,
    pub data: Vec<u8>,
}

impl StoredWeatherEffect {
    pub fn from_effect(effect: &WeatherEffect) -> Result<Self> {
        Ok(Self {
            id: effect.id.raw(),
            data: encode(effect)?,
        })
    }

    pub fn to_effect(&self) -> Result<WeatherEffect> {
        decode(&self.data)
    }
}
