//! Game services - breeding, planting, plant care, sales and sharing
//!
//! Each operation reads what it needs from the store, runs the pure rules
//! from `growroom-core`, and writes the result back. Operations on the same
//! plant or the same parent pair hold that entity's lock for the whole
//! read-compute-write; a store version conflict is retried once.

use crate::context::SimContext;
use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventBus};
use crate::locks::LockKey;
use growroom_core::genetics::{self, generate_base_genetics, random_strain_name};
use growroom_core::growth::{self, inspect, recommendations, Inspection};
use growroom_core::market::sale_price;
use growroom_core::player::STARTER_STRAINS;
use growroom_core::time::hours_between;
use growroom_core::{
    BreedOutcome, Breeder, Genetics, GeneticsId, LocationId, Plant, PlantId, Player, PlayerId,
};
use growroom_db::{sequence, BreedingCommit, BreedingRecord, SaleRecord};
use growroom_net::PlantActionKind;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// A breeding attempt and the breeder after it was recorded
#[derive(Debug, Clone)]
pub struct Bred {
    pub outcome: BreedOutcome,
    pub player: Player,
}

/// Result of one plant action
#[derive(Debug, Clone)]
pub struct PlantActionOutcome {
    pub plant: Plant,
    pub growth_gained: Option<f64>,
    pub harvest_weight: Option<f64>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Sale {
    pub record: SaleRecord,
    pub player: Player,
}

pub struct GameService {
    ctx: Arc<SimContext>,
    events: EventBus,
}

fn retry_on_conflict<T>(what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(err) if err.is_conflict() => {
            debug!(what, error = %err, "write conflict, retrying");
            op()
        }
        other => other,
    }
}

impl GameService {
    pub fn new(ctx: Arc<SimContext>, events: EventBus) -> Self {
        Self { ctx, events }
    }

    pub fn context(&self) -> &Arc<SimContext> {
        &self.ctx
    }

    /// Load a player, creating them with their starter strains on first sight
    pub fn ensure_player(&self, id: PlayerId, name: &str) -> Result<Player> {
        let store = &self.ctx.store;
        if let Some(player) = store.load_player(id)? {
            return Ok(player);
        }

        let now = self.ctx.now();
        let mut rng = self.ctx.rng();
        let mut strains = Vec::with_capacity(STARTER_STRAINS);
        for _ in 0..STARTER_STRAINS {
            let genetics_id = GeneticsId(store.next_id(sequence::GENETICS)?);
            let strain_name = random_strain_name(&mut rng);
            strains.push(generate_base_genetics(genetics_id, strain_name, &mut rng, now));
        }

        let player = Player::new(id, name, now);
        match store.grant_starter(&player, &strains, now)? {
            Some(created) => {
                info!(player = %id, strains = strains.len(), "created player");
                Ok(created)
            }
            // Created concurrently by another connection
            None => Ok(store.player(id)?),
        }
    }

    pub async fn breed(
        &self,
        player: PlayerId,
        parent1: GeneticsId,
        parent2: GeneticsId,
    ) -> Result<Bred> {
        let _guard = self
            .ctx
            .locks
            .lock(LockKey::parent_pair(parent1, parent2))
            .await;
        let bred = retry_on_conflict("breed", || self.try_breed(player, parent1, parent2))?;

        if let BreedOutcome::Success { offspring, .. } = &bred.outcome {
            info!(
                player = %player,
                genetics = %offspring.id,
                rarity = ?offspring.rarity,
                "bred new strain"
            );
            self.events.publish(DomainEvent::GeneticsBred {
                player,
                genetics: offspring.id,
                rarity: offspring.rarity,
                at: offspring.created_at,
            });
        }
        Ok(bred)
    }

    fn try_breed(&self, player: PlayerId, p1: GeneticsId, p2: GeneticsId) -> Result<Bred> {
        let store = &self.ctx.store;
        let parent1 = store.genetics(p1)?;
        let parent2 = store.genetics(p2)?;
        let mut breeder = store.player(player)?;
        let owned: HashSet<GeneticsId> = store
            .owned_genetics(player)?
            .into_iter()
            .map(|o| o.genetics)
            .collect();

        let now = self.ctx.now();
        let offspring_id = GeneticsId(store.next_id(sequence::GENETICS)?);
        let outcome = genetics::breed(
            &parent1,
            &parent2,
            &Breeder {
                player,
                level: breeder.level,
                owned,
            },
            offspring_id,
            &mut self.ctx.rng(),
            now,
        )?;

        let (offspring, experience, tokens) = match &outcome {
            BreedOutcome::Success {
                offspring, reward, ..
            } => {
                breeder.award(reward.experience, reward.currency);
                breeder.strains_bred += 1;
                (
                    Some(offspring.as_ref().clone()),
                    reward.experience,
                    reward.currency,
                )
            }
            BreedOutcome::Failure { .. } => (None, 0, 0),
        };
        breeder.last_active = now;

        let (player, _record) = store.commit_breeding(
            &BreedingCommit {
                breeder,
                parent1: p1,
                parent2: p2,
                offspring,
                success_probability: outcome.success_probability(),
                experience_gained: experience,
                tokens_gained: tokens,
            },
            now,
        )?;
        Ok(Bred { outcome, player })
    }

    pub fn plant_seed(
        &self,
        player: PlayerId,
        genetics: GeneticsId,
        location: LocationId,
    ) -> Result<Plant> {
        let store = &self.ctx.store;
        if !store.owns(player, genetics)? {
            return Err(growroom_core::Error::ownership("genetics", genetics, player).into());
        }
        let site = store
            .load_location(location)?
            .ok_or_else(|| growroom_core::Error::not_found(location))?;
        if !site.is_active {
            return Err(growroom_core::Error::validation(format!(
                "{} is not open for planting",
                site.name
            ))
            .into());
        }

        let plant = Plant::seed(
            PlantId(store.next_id(sequence::PLANT)?),
            player,
            genetics,
            location,
            self.ctx.now(),
        );
        store.insert_plant(&plant)?;
        debug!(player = %player, plant = %plant.id, "seeded plant");
        Ok(plant)
    }

    pub async fn plant_action(
        &self,
        player: PlayerId,
        action: PlantActionKind,
        plant: PlantId,
    ) -> Result<PlantActionOutcome> {
        let _guard = self.ctx.locks.lock(LockKey::Plant(plant)).await;
        let outcome = retry_on_conflict("plant_action", || {
            self.try_plant_action(player, action, plant)
        })?;

        let at = outcome.plant.last_updated;
        if let Some(weight) = outcome.harvest_weight {
            self.events.publish(DomainEvent::PlantHarvested {
                player,
                plant,
                weight,
                at,
            });
        }
        if outcome.plant.status == growth::PlantStatus::Dead {
            info!(player = %player, plant = %plant, "plant died");
            self.events
                .publish(DomainEvent::PlantDied { player, plant, at });
        }
        Ok(outcome)
    }

    fn try_plant_action(
        &self,
        player: PlayerId,
        action: PlantActionKind,
        id: PlantId,
    ) -> Result<PlantActionOutcome> {
        let store = &self.ctx.store;
        let mut plant = store.plant(id)?;
        if plant.owner != player {
            return Err(growroom_core::Error::ownership("plant", id, player).into());
        }

        if !plant.is_growing() {
            return Err(growroom_core::Error::validation(format!(
                "{} is no longer growing ({:?})",
                id, plant.status
            ))
            .into());
        }

        // Every action first brings the plant up to date
        let now = self.ctx.now();
        let genetics = store.genetics(plant.genetics_id)?;
        let weather = store.active_weather(now)?;
        let hours = hours_between(plant.last_updated, now);
        let env = plant.environment(&genetics);
        let report = growth::advance(
            &mut plant,
            &genetics,
            hours,
            &env,
            &weather,
            &mut self.ctx.rng(),
            now,
        )?;

        let mut harvest_weight = None;
        if !report.died {
            match action {
                PlantActionKind::Water => plant.water(now)?,
                PlantActionKind::Fertilize => plant.fertilize(now)?,
                PlantActionKind::Advance => {}
                PlantActionKind::Harvest => {
                    harvest_weight = Some(plant.harvest(&genetics, &weather, now)?);
                }
            }
        }

        let plant = store.update_plant(&plant)?;
        let tips = recommendations(&plant, &report.factors);
        Ok(PlantActionOutcome {
            plant,
            growth_gained: Some(report.growth_gained),
            harvest_weight,
            recommendations: tips,
        })
    }

    /// Sell a harvested plant at its current market price
    pub async fn sell(&self, player: PlayerId, plant: PlantId) -> Result<Sale> {
        let _guard = self.ctx.locks.lock(LockKey::Plant(plant)).await;
        let store = &self.ctx.store;
        let harvested = store.plant(plant)?;
        if harvested.owner != player {
            return Err(growroom_core::Error::ownership("plant", plant, player).into());
        }
        let location_modifier = store
            .load_location(harvested.location_id)?
            .map_or(1.0, |l| l.market_modifier);
        let price_modifier = store
            .market_condition(harvested.location_id, harvested.genetics_id)?
            .map_or(1.0, |c| c.price_modifier);
        let price = sale_price(price_modifier, location_modifier);

        let (player, record) = store.record_sale(
            player,
            plant,
            harvested.location_id,
            price,
            self.ctx.now(),
        )?;
        info!(player = %player.id, plant = %plant, price, "sold harvest");
        Ok(Sale { record, player })
    }

    /// A player's own plant as it stands, without advancing it
    pub fn plant_status(&self, player: PlayerId, id: PlantId) -> Result<(Plant, Inspection)> {
        let store = &self.ctx.store;
        let plant = store.plant(id)?;
        if plant.owner != player {
            return Err(growroom_core::Error::ownership("plant", id, player).into());
        }
        let genetics = store.genetics(plant.genetics_id)?;
        let weather = store.active_weather(self.ctx.now())?;
        let inspection = inspect(&plant, &genetics, &weather);
        Ok((plant, inspection))
    }

    /// Every breeding attempt the player made, oldest first
    pub fn breeding_history(&self, player: PlayerId) -> Result<(Player, Vec<BreedingRecord>)> {
        let store = &self.ctx.store;
        let breeder = store.player(player)?;
        let records = store.breeding_history(player)?;
        Ok((breeder, records))
    }

    /// Read-only view of a strain the player owns, for showing to a room
    pub fn share(&self, player: PlayerId, genetics: GeneticsId) -> Result<Genetics> {
        let store = &self.ctx.store;
        if !store.owns(player, genetics)? {
            return Err(growroom_core::Error::ownership("genetics", genetics, player).into());
        }
        Ok(store.genetics(genetics)?)
    }

    pub fn player(&self, id: PlayerId) -> Result<Player> {
        self.ctx.store.player(id).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use growroom_core::{GameRng, GrowingLocation, GrowthStage, ManualClock, PlantStatus};
    use growroom_db::Store;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn service() -> (GameService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(Store::in_memory().unwrap());
        store
            .save_location(&GrowingLocation {
                id: LocationId(1),
                name: "Greenhouse".into(),
                market_modifier: 1.2,
                is_active: true,
            })
            .unwrap();
        let ctx = SimContext::new(
            store,
            clock.clone(),
            GameRng::new(7),
            CoordinatorConfig::default(),
        );
        (GameService::new(Arc::new(ctx), EventBus::default()), clock)
    }

    fn starter_ids(service: &GameService, player: PlayerId) -> Vec<GeneticsId> {
        let mut ids: Vec<GeneticsId> = service
            .ctx
            .store
            .owned_genetics(player)
            .unwrap()
            .into_iter()
            .map(|o| o.genetics)
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_ensure_player_grants_starters_once() {
        let (service, _) = service();
        let player = service.ensure_player(PlayerId(1), "Ada").unwrap();
        assert_eq!(player.tokens, growroom_core::player::STARTING_TOKENS);
        assert_eq!(starter_ids(&service, PlayerId(1)).len(), STARTER_STRAINS);

        service.ensure_player(PlayerId(1), "Ada").unwrap();
        assert_eq!(starter_ids(&service, PlayerId(1)).len(), STARTER_STRAINS);
    }

    #[tokio::test]
    async fn test_breed_records_every_attempt() {
        let (service, _) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        let ids = starter_ids(&service, PlayerId(1));

        let mut successes = 0;
        for _ in 0..10 {
            let bred = service.breed(PlayerId(1), ids[0], ids[1]).await.unwrap();
            if let BreedOutcome::Success { offspring, .. } = &bred.outcome {
                successes += 1;
                assert_eq!(offspring.generation, 1);
                assert!(service.ctx.store.owns(PlayerId(1), offspring.id).unwrap());
            }
        }

        let (player, history) = service.breeding_history(PlayerId(1)).unwrap();
        assert_eq!(history.len(), 10);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(history.iter().filter(|r| r.is_success()).count(), successes);
        assert_eq!(player.strains_bred as usize, successes);
        assert_eq!(player.lab_level(), 1 + successes as u32 / 5);
    }

    #[tokio::test]
    async fn test_breed_rejects_foreign_parents() {
        let (service, _) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        service.ensure_player(PlayerId(2), "Bo").unwrap();
        let mine = starter_ids(&service, PlayerId(1));
        let theirs = starter_ids(&service, PlayerId(2));

        let err = service
            .breed(PlayerId(1), mine[0], theirs[0])
            .await
            .unwrap_err();
        assert!(err.is_ownership());
        assert!(service
            .ctx
            .store
            .breeding_history(PlayerId(1))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_grow_harvest_and_sell() {
        let (service, clock) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        let strain = starter_ids(&service, PlayerId(1))[0];

        let plant = service
            .plant_seed(PlayerId(1), strain, LocationId(1))
            .unwrap();
        assert_eq!(plant.stage, GrowthStage::Seedling);

        let err = service
            .plant_action(PlayerId(2), PlantActionKind::Water, plant.id)
            .await
            .unwrap_err();
        assert!(err.is_ownership());

        let mut last_points = 0.0;
        for day in 0..40 {
            clock.advance(Duration::hours(24));
            let action = if day % 3 == 0 {
                PlantActionKind::Water
            } else {
                PlantActionKind::Advance
            };
            let outcome = service
                .plant_action(PlayerId(1), action, plant.id)
                .await
                .unwrap();
            assert!(outcome.growth_gained.unwrap() >= 0.0);
            assert!(outcome.plant.growth_points >= last_points);
            last_points = outcome.plant.growth_points;
            if outcome.plant.stage == GrowthStage::Harvest {
                break;
            }
        }

        let grown = service.ctx.store.plant(plant.id).unwrap();
        assert_eq!(grown.status, PlantStatus::Growing);
        assert_eq!(grown.stage, GrowthStage::Harvest);
        let outcome = service
            .plant_action(PlayerId(1), PlantActionKind::Harvest, plant.id)
            .await
            .unwrap();
        assert!(outcome.harvest_weight.unwrap() > 0.0);
        assert!(service
            .plant_action(PlayerId(1), PlantActionKind::Advance, plant.id)
            .await
            .is_err());

        let sale = service.sell(PlayerId(1), plant.id).await.unwrap();
        // No market condition yet: base price times the location modifier
        assert_eq!(sale.record.price, 60);
        assert_eq!(
            sale.player.tokens,
            growroom_core::player::STARTING_TOKENS + 60
        );
        assert!(service.sell(PlayerId(1), plant.id).await.is_err());
    }

    #[test]
    fn test_plant_status_is_read_only() {
        let (service, clock) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        let strain = starter_ids(&service, PlayerId(1))[0];
        let plant = service
            .plant_seed(PlayerId(1), strain, LocationId(1))
            .unwrap();

        clock.advance(Duration::hours(12));
        let (seen, inspection) = service.plant_status(PlayerId(1), plant.id).unwrap();
        assert_eq!(seen, plant);
        assert_eq!(inspection.potency.development, 0.0);
        assert_eq!(inspection.hours_to_harvest, plant.hours_to_harvest());
        assert_eq!(service.ctx.store.plant(plant.id).unwrap(), plant);

        assert!(service
            .plant_status(PlayerId(2), plant.id)
            .unwrap_err()
            .is_ownership());
    }

    #[test]
    fn test_plant_seed_requires_ownership_and_open_location() {
        let (service, _) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        let strain = starter_ids(&service, PlayerId(1))[0];

        let err = service
            .plant_seed(PlayerId(2), strain, LocationId(1))
            .unwrap_err();
        assert!(err.is_ownership());
        assert!(service
            .plant_seed(PlayerId(1), strain, LocationId(9))
            .is_err());
    }

    #[test]
    fn test_share_requires_ownership() {
        let (service, _) = service();
        service.ensure_player(PlayerId(1), "Ada").unwrap();
        let strain = starter_ids(&service, PlayerId(1))[0];
        assert_eq!(service.share(PlayerId(1), strain).unwrap().id, strain);
        assert!(service.share(PlayerId(2), strain).unwrap_err().is_ownership());
    }
}
