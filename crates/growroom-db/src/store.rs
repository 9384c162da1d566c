//! Database store wrapper.

use crate::error::{Error, Result};
use crate::ledger::{AcquisitionSource, BreedingRecord, Ownership, SaleRecord, TradeRecord};
use crate::models::*;
use chrono::{DateTime, Utc};
use growroom_core::{
    GeneticsId, Genetics, GrowingLocation, LocationId, MarketCondition, MarketEvent,
    MarketEventId, Plant, PlantId, Player, PlayerId, WeatherEffect, WeatherEffectId,
};
use native_db::transaction::RwTransaction;
use native_db::*;
use std::path::Path;
use std::sync::LazyLock;

// Static models for the database
static MODELS: LazyLock<Models> = LazyLock::new(|| {
    let mut models = Models::new();
    models.define::<StoredSequence>().unwrap();
    models.define::<StoredPlayer>().unwrap();
    models.define::<StoredGenetics>().unwrap();
    models.define::<StoredOwnership>().unwrap();
    models.define::<StoredBreedingRecord>().unwrap();
    models.define::<StoredTradeRecord>().unwrap();
    models.define::<StoredSale>().unwrap();
    models.define::<StoredPlant>().unwrap();
    models.define::<StoredLocation>().unwrap();
    models.define::<StoredWeatherEffect>().unwrap();
    models.define::<StoredMarketCondition>().unwrap();
    models.define::<StoredPricePoint>().unwrap();
    models.define::<StoredMarketEvent>().unwrap();
    models
});

/// Names of the id sequences handed out by [`Store::next_id`].
pub mod sequence {
    pub const GENETICS: &str = "genetics";
    pub const PLANT: &str = "plant";
    pub const LOCATION: &str = "location";
    pub const WEATHER: &str = "weather";
    pub const MARKET_EVENT: &str = "market_event";
    pub const TRADE: &str = "trade";
    pub const BREEDING: &str = "breeding";
    pub const SALE: &str = "sale";
    pub const PRICE_POINT: &str = "price_point";
}

/// Database store for the persistent game economy.
pub struct Store {
    pub(crate) db: Database<'static>,
}

/// Bump a sequence inside an open write transaction.
pub(crate) fn bump_sequence(rw: &RwTransaction<'_>, name: &str) -> Result<u64> {
    let current: Option<StoredSequence> = rw.get().primary(name.to_string())?;
    let next = current.map_or(0, |s| s.last) + 1;
    rw.upsert(StoredSequence {
        name: name.to_string(),
        last: next,
    })?;
    Ok(next)
}

/// Drain a native_db scan into a vector.
pub(crate) fn collect<T>(
    iter: impl Iterator<Item = native_db::db_type::Result<T>>,
) -> Result<Vec<T>> {
    iter.collect::<std::result::Result<Vec<T>, _>>()
        .map_err(|e| Error::Database(e.to_string()))
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Builder::new()
            .create(&MODELS, path.as_ref())
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Create an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let db = Builder::new()
            .create_in_memory(&MODELS)
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(Self { db })
    }

    /// Allocate the next id of a sequence. Ids start at 1.
    pub fn next_id(&self, name: &str) -> Result<u64> {
        let rw = self.db.rw_transaction()?;
        let id = bump_sequence(&rw, name)?;
        rw.commit()?;
        Ok(id)
    }

    // ---- players ----

    pub fn load_player(&self, id: PlayerId) -> Result<Option<Player>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredPlayer> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_player()).transpose()
    }

    pub fn player(&self, id: PlayerId) -> Result<Player> {
        self.load_player(id)?.ok_or_else(|| Error::not_found(id))
    }

    /// Write back a player read earlier.
    ///
    /// Fails with [`Error::Conflict`] if someone else wrote the player since
    /// it was read. Returns the player carrying its new version.
    pub fn save_player(&self, player: &Player) -> Result<Player> {
        let rw = self.db.rw_transaction()?;
        let saved = put_player(&rw, player)?;
        rw.commit()?;
        Ok(saved)
    }

    pub fn players(&self) -> Result<Vec<Player>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredPlayer>()?.all()?)?;
        stored.iter().map(StoredPlayer::to_player).collect()
    }

    // ---- genetics and ownership ----

    pub fn insert_genetics(&self, genetics: &Genetics) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.insert(StoredGenetics::from_genetics(genetics)?)?;
        rw.commit()?;
        Ok(())
    }

    pub fn load_genetics(&self, id: GeneticsId) -> Result<Option<Genetics>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredGenetics> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_genetics()).transpose()
    }

    pub fn genetics(&self, id: GeneticsId) -> Result<Genetics> {
        self.load_genetics(id)?.ok_or_else(|| Error::not_found(id))
    }

    pub fn all_genetics(&self) -> Result<Vec<Genetics>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredGenetics>()?.all()?)?;
        stored.iter().map(StoredGenetics::to_genetics).collect()
    }

    pub fn owns(&self, player: PlayerId, genetics: GeneticsId) -> Result<bool> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredOwnership> =
            r.get().primary(StoredOwnership::key(player, genetics))?;
        Ok(stored.is_some())
    }

    pub fn owned_genetics(&self, player: PlayerId) -> Result<Vec<Ownership>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredOwnership>(StoredOwnershipKey::player_id)?;
        let stored = collect(scan.start_with(player.raw())?)?;
        stored.iter().map(StoredOwnership::to_ownership).collect()
    }

    // ---- plants ----

    pub fn insert_plant(&self, plant: &Plant) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.insert(StoredPlant::from_plant(plant)?)?;
        rw.commit()?;
        Ok(())
    }

    pub fn load_plant(&self, id: PlantId) -> Result<Option<Plant>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredPlant> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_plant()).transpose()
    }

    pub fn plant(&self, id: PlantId) -> Result<Plant> {
        self.load_plant(id)?.ok_or_else(|| Error::not_found(id))
    }

    /// Versioned write, same contract as [`Store::save_player`].
    pub fn update_plant(&self, plant: &Plant) -> Result<Plant> {
        let rw = self.db.rw_transaction()?;
        let saved = put_plant(&rw, plant)?;
        rw.commit()?;
        Ok(saved)
    }

    pub fn plants_for_owner(&self, owner: PlayerId) -> Result<Vec<Plant>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().secondary::<StoredPlant>(StoredPlantKey::owner_id)?;
        let stored = collect(scan.start_with(owner.raw())?)?;
        stored.iter().map(StoredPlant::to_plant).collect()
    }

    pub fn all_plants(&self) -> Result<Vec<Plant>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredPlant>()?.all()?)?;
        stored.iter().map(StoredPlant::to_plant).collect()
    }

    pub fn growing_plants(&self) -> Result<Vec<Plant>> {
        Ok(self
            .all_plants()?
            .into_iter()
            .filter(Plant::is_growing)
            .collect())
    }

    // ---- locations ----

    pub fn save_location(&self, location: &GrowingLocation) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredLocation::from_location(location)?)?;
        rw.commit()?;
        Ok(())
    }

    pub fn load_location(&self, id: LocationId) -> Result<Option<GrowingLocation>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredLocation> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_location()).transpose()
    }

    pub fn locations(&self) -> Result<Vec<GrowingLocation>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredLocation>()?.all()?)?;
        stored.iter().map(StoredLocation::to_location).collect()
    }

    // ---- weather ----

    pub fn save_weather_effect(&self, effect: &WeatherEffect) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.upsert(StoredWeatherEffect::from_effect(effect)?)?;
        rw.commit()?;
        Ok(())
    }

    pub fn weather_effects(&self) -> Result<Vec<WeatherEffect>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredWeatherEffect>()?.all()?)?;
        stored.iter().map(StoredWeatherEffect::to_effect).collect()
    }

    /// Effects in force at `now`, newest first.
    pub fn active_weather(&self, now: DateTime<Utc>) -> Result<Vec<WeatherEffect>> {
        Ok(growroom_core::weather::active_effects(
            &self.weather_effects()?,
            now,
        ))
    }

    /// End an effect ahead of schedule.
    pub fn end_weather_effect(
        &self,
        id: WeatherEffectId,
        now: DateTime<Utc>,
    ) -> Result<WeatherEffect> {
        let rw = self.db.rw_transaction()?;
        let stored: Option<StoredWeatherEffect> = rw.get().primary(id.raw())?;
        let mut effect = stored
            .ok_or_else(|| Error::not_found(id))?
            .to_effect()?;
        effect.end_early(now);
        rw.upsert(StoredWeatherEffect::from_effect(&effect)?)?;
        rw.commit()?;
        Ok(effect)
    }

    /// Flip the active flag off on effects whose window has passed.
    pub fn expire_weather(&self, now: DateTime<Utc>) -> Result<usize> {
        let effects = self.weather_effects()?;
        let rw = self.db.rw_transaction()?;
        let mut expired = 0;
        for mut effect in effects {
            if effect.is_active && effect.end_time <= now {
                effect.is_active = false;
                rw.upsert(StoredWeatherEffect::from_effect(&effect)?)?;
                expired += 1;
            }
        }
        rw.commit()?;
        Ok(expired)
    }

    // ---- market ----

    pub fn market_condition(
        &self,
        location: LocationId,
        strain: GeneticsId,
    ) -> Result<Option<MarketCondition>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredMarketCondition> = r
            .get()
            .primary(StoredMarketCondition::key(location, strain))?;
        stored.map(|s| s.to_condition()).transpose()
    }

    pub fn market_conditions(&self) -> Result<Vec<MarketCondition>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredMarketCondition>()?.all()?)?;
        stored.iter().map(StoredMarketCondition::to_condition).collect()
    }

    pub fn conditions_for_strain(&self, strain: GeneticsId) -> Result<Vec<MarketCondition>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredMarketCondition>(StoredMarketConditionKey::strain_id)?;
        let stored = collect(scan.start_with(strain.raw())?)?;
        stored.iter().map(StoredMarketCondition::to_condition).collect()
    }

    pub fn insert_market_event(&self, event: &MarketEvent) -> Result<()> {
        let rw = self.db.rw_transaction()?;
        rw.insert(StoredMarketEvent::from_event(event)?)?;
        rw.commit()?;
        Ok(())
    }

    pub fn market_event(&self, id: MarketEventId) -> Result<Option<MarketEvent>> {
        let r = self.db.r_transaction()?;
        let stored: Option<StoredMarketEvent> = r.get().primary(id.raw())?;
        stored.map(|s| s.to_event()).transpose()
    }

    pub fn market_events(&self) -> Result<Vec<MarketEvent>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredMarketEvent>()?.all()?)?;
        stored.iter().map(StoredMarketEvent::to_event).collect()
    }

    pub fn active_market_events(&self, now: DateTime<Utc>) -> Result<Vec<MarketEvent>> {
        Ok(self
            .market_events()?
            .into_iter()
            .filter(|e| e.is_active_at(now))
            .collect())
    }

    /// Flip the active flag off on events whose window has passed.
    pub fn deactivate_expired_events(&self, now: DateTime<Utc>) -> Result<usize> {
        let events = self.market_events()?;
        let rw = self.db.rw_transaction()?;
        let mut expired = 0;
        for mut event in events {
            if event.is_active && event.end_time <= now {
                event.is_active = false;
                rw.upsert(StoredMarketEvent::from_event(&event)?)?;
                expired += 1;
            }
        }
        rw.commit()?;
        Ok(expired)
    }

    // ---- ledgers ----

    /// A player's breeding attempts, oldest first.
    pub fn breeding_history(&self, player: PlayerId) -> Result<Vec<BreedingRecord>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredBreedingRecord>(StoredBreedingRecordKey::player_id)?;
        let stored = collect(scan.start_with(player.raw())?)?;
        let mut records: Vec<BreedingRecord> = stored
            .iter()
            .map(StoredBreedingRecord::to_record)
            .collect::<Result<_>>()?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    pub fn trade_records(&self) -> Result<Vec<TradeRecord>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredTradeRecord>()?.all()?)?;
        stored.iter().map(StoredTradeRecord::to_record).collect()
    }

    pub fn sales_for_strain(&self, strain: GeneticsId) -> Result<Vec<SaleRecord>> {
        let r = self.db.r_transaction()?;
        let scan = r.scan().secondary::<StoredSale>(StoredSaleKey::strain_id)?;
        let stored = collect(scan.start_with(strain.raw())?)?;
        stored.iter().map(StoredSale::to_sale).collect()
    }

    pub fn sales(&self) -> Result<Vec<SaleRecord>> {
        let r = self.db.r_transaction()?;
        let stored = collect(r.scan().primary::<StoredSale>()?.all()?)?;
        stored.iter().map(StoredSale::to_sale).collect()
    }
}

/// Versioned player write inside an open transaction.
pub(crate) fn put_player(rw: &RwTransaction<'_>, player: &Player) -> Result<Player> {
    let stored: Option<StoredPlayer> = rw.get().primary(player.id.raw())?;
    match stored {
        Some(s) if s.version != player.version => {
            return Err(Error::Conflict(format!(
                "{} changed (read version {}, stored {})",
                player.id, player.version, s.version
            )))
        }
        None => return Err(Error::not_found(player.id)),
        Some(_) => {}
    }
    let mut saved = player.clone();
    saved.version += 1;
    rw.upsert(StoredPlayer::from_player(&saved)?)?;
    Ok(saved)
}

/// Versioned plant write inside an open transaction.
pub(crate) fn put_plant(rw: &RwTransaction<'_>, plant: &Plant) -> Result<Plant> {
    let stored: Option<StoredPlant> = rw.get().primary(plant.id.raw())?;
    let stored = stored.ok_or_else(|| Error::not_found(plant.id))?;
    if stored.version != plant.version {
        return Err(Error::Conflict(format!(
            "{} changed (read version {}, stored {})",
            plant.id, plant.version, stored.version
        )));
    }
    let mut saved = plant.clone();
    saved.version += 1;
    // The owner is a secondary key, so replace the row rather than patch it.
    rw.remove(stored)?;
    rw.insert(StoredPlant::from_plant(&saved)?)?;
    Ok(saved)
}

pub(crate) fn put_ownership(
    rw: &RwTransaction<'_>,
    player: PlayerId,
    genetics: GeneticsId,
    source: AcquisitionSource,
    now: DateTime<Utc>,
) -> Result<()> {
    let existing: Option<StoredOwnership> =
        rw.get().primary(StoredOwnership::key(player, genetics))?;
    if existing.is_none() {
        rw.insert(StoredOwnership::from_ownership(&Ownership {
            player,
            genetics,
            source,
            acquired_at: now,
        })?)?;
    }
    Ok(())
}

impl From<native_db::db_type::Error> for Error {
    fn from(err: native_db::db_type::Error) -> Self {
        Error::Database(err.to_string())
    }
}
