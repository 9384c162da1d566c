//! Players, strains and the ledgers around them.

use super::{decode, encode};
use crate::error::Result;
use crate::ledger::{BreedingRecord, Ownership, SaleRecord, TradeRecord};
use growroom_core::{GeneticsId, Genetics, Player, PlayerId};
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// Monotonic id allocator, one row per sequence name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct StoredSequence {
    #[primary_key]
    pub name: String,
    /// Last id handed out.
    pub last: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct StoredPlayer {
    #[primary_key]
    pub id: u64,
    pub version: u64,
    /// Serialized [`Player`].
    pub data: Vec<u8>,
}

impl StoredPlayer {
    pub fn from_player(player: &Player) -> Result<Self> {
        Ok(Self {
            id: player.id.raw(),
            version: player.version,
            data: encode(player)?,
        })
    }

    pub fn to_player(&self) -> Result<Player> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct StoredGenetics {
    #[primary_key]
    pub id: u64,
    /// Serialized [`Genetics`].
    pub data: Vec<u8>,
}

impl StoredGenetics {
    pub fn from_genetics(genetics: &Genetics) -> Result<Self> {
        Ok(Self {
            id: genetics.id.raw(),
            data: encode(genetics)?,
        })
    }

    pub fn to_genetics(&self) -> Result<Genetics> {
        decode(&self.data)
    }
}

/// Which player holds which strain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 4, version = 1)]
#[native_db]
pub struct StoredOwnership {
    /// "player:genetics"
    #[primary_key]
    pub key: String,
    #[secondary_key]
    pub player_id: u64,
    pub genetics_id: u64,
    /// Serialized [`Ownership`].
    pub data: Vec<u8>,
}

impl StoredOwnership {
    pub fn key(player: PlayerId, genetics: GeneticsId) -> String {
        format!("{}:{}", player.raw(), genetics.raw())
    }

    pub fn from_ownership(ownership: &Ownership) -> Result<Self> {
        Ok(Self {
            key: Self::key(ownership.player, ownership.genetics),
            player_id: ownership.player.raw(),
            genetics_id: ownership.genetics.raw(),
            data: encode(ownership)?,
        })
    }

    pub fn to_ownership(&self) -> Result<Ownership> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 5, version = 1)]
#[native_db]
pub struct StoredBreedingRecord {
    #[primary_key]
    pub id: u64,
    #[secondary_key]
    pub player_id: u64,
    pub data: Vec<u8>,
}

impl StoredBreedingRecord {
    pub fn from_record(record: &BreedingRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            player_id: record.player.raw(),
            data: encode(record)?,
        })
    }

    pub fn to_record(&self) -> Result<BreedingRecord> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 6, version = 1)]
#[native_db]
pub struct StoredTradeRecord {
    #[primary_key]
    pub id: u64,
    pub data: Vec<u8>,
}

impl StoredTradeRecord {
    pub fn from_record(record: &TradeRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.raw(),
            data: encode(record)?,
        })
    }

    pub fn to_record(&self) -> Result<TradeRecord> {
        decode(&self.data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[native_model(id = 7, version = 1)]
#[native_db]
pub struct StoredSale {
    #[primary_key]
    pub id: u64,
    #[secondary_key]
    pub strain_id: u64,
    pub data: Vec<u8>,
}

impl StoredSale {
    pub fn from_sale(sale: &SaleRecord) -> Result<Self> {
        Ok(Self {
            id: sale.id,
            strain_id: sale.strain.raw(),
            data: encode(sale)?,
        })
    }

    pub fn to_sale(&self) -> Result<SaleRecord> {
        decode(&self.data)
    }
}
