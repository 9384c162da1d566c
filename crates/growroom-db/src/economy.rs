//! Multi-record economy changes, each committed in one write transaction.
//!
//! Returning early with `?` drops the open transaction, which rolls back
//! everything written so far.

use crate::error::{Error, Result};
use crate::ledger::{AcquisitionSource, BreedingRecord, SaleRecord, TradeRecord};
use crate::models::*;
use crate::store::{bump_sequence, put_ownership, put_plant, put_player, sequence, Store};
use chrono::{DateTime, Utc};
use growroom_core::{
    GeneticsId, Genetics, LocationId, MarketCondition, MarketEvent, MarketEventId, Plant,
    PlantId, PlantStatus, Player, PlayerId, PricePoint, TradeItem, TradeOffer, TradeStatus,
};
use native_db::transaction::RwTransaction;

/// Everything one breeding attempt changes.
#[derive(Debug, Clone)]
pub struct BreedingCommit {
    /// The breeder as read before the attempt, with rewards already applied.
    pub breeder: Player,
    pub parent1: GeneticsId,
    pub parent2: GeneticsId,
    /// Present only for a successful cross.
    pub offspring: Option<Genetics>,
    pub success_probability: f64,
    pub experience_gained: u64,
    pub tokens_gained: u64,
}

impl Store {
    /// Create a player with their starter strains.
    ///
    /// Returns `None` when the player already exists; nothing is written then.
    pub fn grant_starter(
        &self,
        player: &Player,
        strains: &[Genetics],
        now: DateTime<Utc>,
    ) -> Result<Option<Player>> {
        let rw = self.db.rw_transaction()?;
        let existing: Option<StoredPlayer> = rw.get().primary(player.id.raw())?;
        if existing.is_some() {
            return Ok(None);
        }
        rw.insert(StoredPlayer::from_player(player)?)?;
        for genetics in strains {
            rw.insert(StoredGenetics::from_genetics(genetics)?)?;
            put_ownership(
                &rw,
                player.id,
                genetics.id,
                AcquisitionSource::Starter,
                now,
            )?;
        }
        rw.commit()?;
        Ok(Some(player.clone()))
    }

    /// Persist a breeding attempt: offspring, ownership, history and the
    /// breeder's rewards land together or not at all.
    pub fn commit_breeding(
        &self,
        commit: &BreedingCommit,
        now: DateTime<Utc>,
    ) -> Result<(Player, BreedingRecord)> {
        let rw = self.db.rw_transaction()?;
        let breeder = put_player(&rw, &commit.breeder)?;

        if let Some(offspring) = &commit.offspring {
            let existing: Option<StoredGenetics> = rw.get().primary(offspring.id.raw())?;
            if existing.is_some() {
                return Err(Error::Conflict(format!("{} already exists", offspring.id)));
            }
            rw.insert(StoredGenetics::from_genetics(offspring)?)?;
            put_ownership(
                &rw,
                breeder.id,
                offspring.id,
                AcquisitionSource::Bred,
                now,
            )?;
        }

        let record = BreedingRecord {
            id: bump_sequence(&rw, sequence::BREEDING)?,
            player: breeder.id,
            parent1: commit.parent1,
            parent2: commit.parent2,
            offspring: commit.offspring.as_ref().map(|g| g.id),
            rarity: commit.offspring.as_ref().map(|g| g.rarity),
            success_probability: commit.success_probability,
            experience_gained: commit.experience_gained,
            tokens_gained: commit.tokens_gained,
            created_at: now,
        };
        rw.insert(StoredBreedingRecord::from_record(&record)?)?;
        rw.commit()?;
        Ok((breeder, record))
    }

    /// Move every item of an accepted offer between the two parties.
    ///
    /// Ownership and balances are re-checked against the stored state, so
    /// an offer that was valid when made but not any more fails without
    /// moving anything.
    pub fn settle_trade(&self, offer: &TradeOffer, now: DateTime<Utc>) -> Result<TradeRecord> {
        if offer.status != TradeStatus::Accepted {
            return Err(growroom_core::Error::validation(format!(
                "{} is {:?}, not accepted",
                offer.id, offer.status
            ))
            .into());
        }
        let rw = self.db.rw_transaction()?;
        let mut initiator = load_player_in(&rw, offer.initiator)?;
        let mut target = load_player_in(&rw, offer.target)?;

        for item in &offer.items.offered {
            transfer(&rw, item, &mut initiator, &mut target, now)?;
        }
        for item in &offer.items.requested {
            transfer(&rw, item, &mut target, &mut initiator, now)?;
        }
        put_player(&rw, &initiator)?;
        put_player(&rw, &target)?;

        let record = TradeRecord {
            id: offer.id,
            offer: offer.clone(),
            settled_at: now,
        };
        let existing: Option<StoredTradeRecord> = rw.get().primary(offer.id.raw())?;
        if existing.is_some() {
            return Err(Error::Conflict(format!("{} already settled", offer.id)));
        }
        rw.insert(StoredTradeRecord::from_record(&record)?)?;
        rw.commit()?;
        Ok(record)
    }

    /// Sell a harvested plant: mark it sold, pay the seller, log the sale.
    pub fn record_sale(
        &self,
        seller: PlayerId,
        plant: PlantId,
        location: LocationId,
        price: u64,
        now: DateTime<Utc>,
    ) -> Result<(Player, SaleRecord)> {
        let rw = self.db.rw_transaction()?;
        let mut sold = load_plant_in(&rw, plant)?;
        if sold.owner != seller {
            return Err(growroom_core::Error::ownership("plant", plant, seller).into());
        }
        if sold.status != PlantStatus::Harvested {
            return Err(growroom_core::Error::validation(format!(
                "{} has not been harvested or was already sold",
                plant
            ))
            .into());
        }
        sold.status = PlantStatus::Sold;
        sold.last_updated = now;
        put_plant(&rw, &sold)?;

        let mut player = load_player_in(&rw, seller)?;
        player.tokens = player.tokens.saturating_add(price);
        player.last_active = now;
        let player = put_player(&rw, &player)?;

        let sale = SaleRecord {
            id: bump_sequence(&rw, sequence::SALE)?,
            seller,
            plant,
            strain: sold.genetics_id,
            location,
            weight: sold.harvest_weight.unwrap_or(0.0),
            price,
            sold_at: now,
        };
        rw.insert(StoredSale::from_sale(&sale)?)?;
        rw.commit()?;
        Ok((player, sale))
    }

    /// Store one market tick: every recomputed condition, one price-history
    /// entry per condition, and the tick's new event if one spawned.
    ///
    /// The event's id is allocated here; the stored event is returned.
    pub fn commit_market_tick(
        &self,
        conditions: &[MarketCondition],
        event: Option<MarketEvent>,
    ) -> Result<Option<MarketEvent>> {
        let rw = self.db.rw_transaction()?;
        for condition in conditions {
            write_condition(&rw, condition)?;
            let seq = bump_sequence(&rw, sequence::PRICE_POINT)?;
            rw.insert(StoredPricePoint::from_point(
                seq,
                &PricePoint::from(condition),
            )?)?;
        }
        let event = match event {
            Some(mut event) => {
                event.id = MarketEventId(bump_sequence(&rw, sequence::MARKET_EVENT)?);
                rw.insert(StoredMarketEvent::from_event(&event)?)?;
                Some(event)
            }
            None => None,
        };
        rw.commit()?;
        Ok(event)
    }
}

fn write_condition(rw: &RwTransaction<'_>, condition: &MarketCondition) -> Result<()> {
    let key = StoredMarketCondition::key(condition.location, condition.strain);
    let existing: Option<StoredMarketCondition> = rw.get().primary(key)?;
    if let Some(existing) = existing {
        rw.remove(existing)?;
    }
    rw.insert(StoredMarketCondition::from_condition(condition)?)?;
    Ok(())
}

fn load_player_in(rw: &RwTransaction<'_>, id: PlayerId) -> Result<Player> {
    let stored: Option<StoredPlayer> = rw.get().primary(id.raw())?;
    stored.ok_or_else(|| Error::not_found(id))?.to_player()
}

fn load_plant_in(rw: &RwTransaction<'_>, id: PlantId) -> Result<Plant> {
    let stored: Option<StoredPlant> = rw.get().primary(id.raw())?;
    stored.ok_or_else(|| Error::not_found(id))?.to_plant()
}

fn require_ownership(
    rw: &RwTransaction<'_>,
    player: PlayerId,
    genetics: GeneticsId,
) -> Result<StoredOwnership> {
    let stored: Option<StoredOwnership> =
        rw.get().primary(StoredOwnership::key(player, genetics))?;
    stored.ok_or_else(|| growroom_core::Error::ownership("genetics", genetics, player).into())
}

/// Move one item from `from` to `to`.
fn transfer(
    rw: &RwTransaction<'_>,
    item: &TradeItem,
    from: &mut Player,
    to: &mut Player,
    now: DateTime<Utc>,
) -> Result<()> {
    match item {
        TradeItem::Genetics(genetics) => {
            let held = require_ownership(rw, from.id, *genetics)?;
            rw.remove(held)?;
            put_ownership(rw, to.id, *genetics, AcquisitionSource::Traded, now)?;
        }
        TradeItem::Plant(plant) => {
            let mut moved = load_plant_in(rw, *plant)?;
            if moved.owner != from.id {
                return Err(growroom_core::Error::ownership("plant", *plant, from.id).into());
            }
            if matches!(moved.status, PlantStatus::Sold | PlantStatus::Dead) {
                return Err(growroom_core::Error::validation(format!(
                    "{} can no longer be traded",
                    plant
                ))
                .into());
            }
            // Growth since the last update belongs to the plant, not the
            // owner, so the growth clock is left alone.
            moved.owner = to.id;
            put_plant(rw, &moved)?;
        }
        TradeItem::Tokens(amount) => {
            from.spend(*amount)?;
            to.tokens = to.tokens.saturating_add(*amount);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use growroom_core::genetics::generate_base_genetics;
    use growroom_core::market::MarketEventKind;
    use growroom_core::{GameRng, TradeId, TradeItems};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn strain(id: u64) -> Genetics {
        let mut rng = GameRng::new(id);
        generate_base_genetics(GeneticsId(id), "Starter", &mut rng, now())
    }

    fn seeded() -> Store {
        let store = Store::in_memory().unwrap();
        store
            .grant_starter(&Player::new(PlayerId(1), "ada", now()), &[strain(1)], now())
            .unwrap();
        store
            .grant_starter(&Player::new(PlayerId(2), "bo", now()), &[strain(2)], now())
            .unwrap();
        store
    }

    fn accepted(items: TradeItems) -> TradeOffer {
        let mut offer = TradeOffer::new(
            TradeId(1),
            PlayerId(1),
            PlayerId(2),
            items,
            Duration::seconds(900),
            now(),
        )
        .unwrap();
        offer.mark_accepted(now());
        offer
    }

    #[test]
    fn test_grant_starter_once() {
        let store = seeded();
        let again = store
            .grant_starter(&Player::new(PlayerId(1), "ada", now()), &[strain(3)], now())
            .unwrap();
        assert!(again.is_none());
        assert!(store.load_genetics(GeneticsId(3)).unwrap().is_none());
        assert!(store.owns(PlayerId(1), GeneticsId(1)).unwrap());
    }

    #[test]
    fn test_commit_breeding_success() {
        let store = seeded();
        let mut breeder = store.player(PlayerId(1)).unwrap();
        breeder.award(100, 50);
        breeder.strains_bred += 1;
        let mut offspring = strain(10);
        offspring.generation = 1;

        let (saved, record) = store
            .commit_breeding(
                &BreedingCommit {
                    breeder,
                    parent1: GeneticsId(1),
                    parent2: GeneticsId(1),
                    offspring: Some(offspring),
                    success_probability: 60.0,
                    experience_gained: 100,
                    tokens_gained: 50,
                },
                now(),
            )
            .unwrap();

        assert_eq!(saved.version, 1);
        assert!(record.is_success());
        assert!(store.owns(PlayerId(1), GeneticsId(10)).unwrap());
        assert_eq!(store.breeding_history(PlayerId(1)).unwrap(), vec![record]);
    }

    #[test]
    fn test_commit_breeding_rolls_back_on_stale_breeder() {
        let store = seeded();
        let stale = store.player(PlayerId(1)).unwrap();
        let mut fresh = stale.clone();
        fresh.tokens += 1;
        store.save_player(&fresh).unwrap();

        let result = store.commit_breeding(
            &BreedingCommit {
                breeder: stale,
                parent1: GeneticsId(1),
                parent2: GeneticsId(1),
                offspring: Some(strain(11)),
                success_probability: 60.0,
                experience_gained: 100,
                tokens_gained: 50,
            },
            now(),
        );

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert!(store.load_genetics(GeneticsId(11)).unwrap().is_none());
        assert!(store.breeding_history(PlayerId(1)).unwrap().is_empty());
    }

    #[test]
    fn test_settle_trade_moves_items() {
        let store = seeded();
        let offer = accepted(TradeItems {
            offered: vec![TradeItem::Genetics(GeneticsId(1)), TradeItem::Tokens(100)],
            requested: vec![TradeItem::Genetics(GeneticsId(2))],
        });

        store.settle_trade(&offer, now()).unwrap();

        assert!(!store.owns(PlayerId(1), GeneticsId(1)).unwrap());
        assert!(store.owns(PlayerId(2), GeneticsId(1)).unwrap());
        assert!(store.owns(PlayerId(1), GeneticsId(2)).unwrap());
        assert_eq!(store.player(PlayerId(1)).unwrap().tokens, 400);
        assert_eq!(store.player(PlayerId(2)).unwrap().tokens, 600);
        assert_eq!(store.trade_records().unwrap().len(), 1);
    }

    #[test]
    fn test_settle_trade_is_all_or_nothing() {
        let store = seeded();
        // Player 1 does not own strain 2, so the second item fails.
        let offer = accepted(TradeItems {
            offered: vec![
                TradeItem::Genetics(GeneticsId(1)),
                TradeItem::Genetics(GeneticsId(2)),
            ],
            requested: vec![],
        });

        let err = store.settle_trade(&offer, now()).unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected(growroom_core::Error::Ownership { .. })
        ));
        assert!(store.owns(PlayerId(1), GeneticsId(1)).unwrap());
        assert!(!store.owns(PlayerId(2), GeneticsId(1)).unwrap());
        assert!(store.trade_records().unwrap().is_empty());
    }

    #[test]
    fn test_traded_plant_keeps_its_growth() {
        let store = seeded();
        let planted = now() - Duration::hours(30);
        let mut plant = Plant::seed(PlantId(1), PlayerId(1), GeneticsId(1), LocationId(1), planted);
        plant.growth_points = 240.0;
        plant.stage = growroom_core::GrowthStage::Vegetative;
        plant.last_updated = now() - Duration::hours(6);
        store.insert_plant(&plant).unwrap();

        let offer = accepted(TradeItems {
            offered: vec![TradeItem::Plant(PlantId(1))],
            requested: vec![],
        });
        store.settle_trade(&offer, now()).unwrap();

        let moved = store.plant(PlantId(1)).unwrap();
        assert_eq!(moved.owner, PlayerId(2));
        assert_eq!(moved.growth_points, 240.0);
        assert_eq!(moved.stage, growroom_core::GrowthStage::Vegetative);
        // The six hours before the trade are still owed to the next advance
        assert_eq!(moved.last_updated, now() - Duration::hours(6));
        assert_eq!(moved.planted_at, planted);
        assert_eq!(store.plants_for_owner(PlayerId(2)).unwrap(), vec![moved]);
    }

    #[test]
    fn test_settle_trade_requires_acceptance() {
        let store = seeded();
        let mut offer = accepted(TradeItems {
            offered: vec![TradeItem::Tokens(1)],
            requested: vec![],
        });
        offer.status = TradeStatus::Pending;
        assert!(store.settle_trade(&offer, now()).is_err());
    }

    #[test]
    fn test_record_sale() {
        let store = seeded();
        let mut plant = Plant::seed(PlantId(1), PlayerId(1), GeneticsId(1), LocationId(1), now());
        plant.status = PlantStatus::Harvested;
        plant.harvest_weight = Some(120.0);
        store.insert_plant(&plant).unwrap();

        assert!(store
            .record_sale(PlayerId(2), PlantId(1), LocationId(1), 75, now())
            .is_err());
        let (player, sale) = store
            .record_sale(PlayerId(1), PlantId(1), LocationId(1), 75, now())
            .unwrap();
        assert_eq!(player.tokens, 575);
        assert_eq!(sale.weight, 120.0);
        assert_eq!(store.plant(PlantId(1)).unwrap().status, PlantStatus::Sold);
        assert!(store
            .record_sale(PlayerId(1), PlantId(1), LocationId(1), 75, now())
            .is_err());
        assert_eq!(store.sales_for_strain(GeneticsId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_market_tick() {
        let store = seeded();
        let condition = MarketCondition {
            location: LocationId(1),
            strain: GeneticsId(1),
            supply_level: 10.0,
            demand_level: 12.0,
            price_modifier: 1.1,
            volatility: 0.1,
            updated_at: now(),
        };
        let mut rng = GameRng::new(5);
        let event = MarketEvent::new(
            MarketEventId(0),
            MarketEventKind::ALL[0],
            None,
            &mut rng,
            now(),
        );

        let stored = store
            .commit_market_tick(&[condition.clone()], Some(event))
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, MarketEventId(1));

        let mut later = condition.clone();
        later.price_modifier = 1.2;
        store.commit_market_tick(&[later.clone()], None).unwrap();

        assert_eq!(
            store
                .market_condition(LocationId(1), GeneticsId(1))
                .unwrap(),
            Some(later)
        );
        assert_eq!(store.market_conditions().unwrap().len(), 1);
        assert_eq!(
            store
                .price_history(GeneticsId(1), None, now() - Duration::hours(1))
                .unwrap()
                .len(),
            2
        );
        assert_eq!(store.active_market_events(now()).unwrap().len(), 1);
    }
}
