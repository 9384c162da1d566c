//! Market tick bound to the store
//!
//! One tick recomputes every (active location, strain) condition, may spawn
//! a market event, and commits all of it in one transaction. Reads between
//! ticks are served from the cached snapshot.

use crate::context::SimContext;
use crate::error::Result;
use crate::events::{DomainEvent, EventBus};
use chrono::Duration;
use growroom_core::market::{
    compute_condition, market_health, maybe_spawn_event, trend, MarketInputs, PriceTrend,
};
use growroom_core::{GeneticsId, LocationId, MarketCondition, MarketEventId, PricePoint};
use growroom_net::MarketSnapshot;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Longest price history window a client may ask for
pub const MAX_HISTORY_DAYS: u32 = 30;

pub struct MarketEngine {
    ctx: Arc<SimContext>,
    events: EventBus,
    snapshot: RwLock<MarketSnapshot>,
}

impl MarketEngine {
    pub fn new(ctx: Arc<SimContext>, events: EventBus) -> Self {
        let snapshot = MarketSnapshot {
            conditions: Vec::new(),
            events: Vec::new(),
            health: 0.0,
            updated_at: ctx.now(),
        };
        Self {
            ctx,
            events,
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Last computed market state
    pub fn snapshot(&self) -> MarketSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded prices for a strain over the last `days`, oldest first
    pub fn price_history(
        &self,
        strain: GeneticsId,
        location: Option<LocationId>,
        days: u32,
    ) -> Result<(Vec<PricePoint>, Option<PriceTrend>)> {
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(growroom_core::Error::validation(format!(
                "history window must be 1 to {} days, got {}",
                MAX_HISTORY_DAYS, days
            ))
            .into());
        }
        // Unknown strains are an error rather than an empty history
        self.ctx.store.genetics(strain)?;
        let since = self.ctx.now() - Duration::days(i64::from(days));
        let points = self.ctx.store.price_history(strain, location, since)?;
        let trend = trend(&points);
        Ok((points, trend))
    }

    pub fn tick(&self) -> Result<MarketSnapshot> {
        let store = &self.ctx.store;
        let now = self.ctx.now();

        let expired = store.deactivate_expired_events(now)?;
        if expired > 0 {
            debug!(expired, "market events ended");
        }

        let activity = store.market_activity(now)?;
        let active_events = store.active_market_events(now)?;
        let strains = store.all_genetics()?;
        let locations: Vec<_> = store
            .locations()?
            .into_iter()
            .filter(|l| l.is_active)
            .collect();
        let priors: HashMap<(LocationId, GeneticsId), MarketCondition> = store
            .market_conditions()?
            .into_iter()
            .map(|c| ((c.location, c.strain), c))
            .collect();

        let mut rng = self.ctx.rng();
        let mut conditions = Vec::with_capacity(locations.len() * strains.len());
        for location in &locations {
            for strain in &strains {
                let inputs = MarketInputs {
                    location: location.id,
                    strain,
                    supply: activity.supply(location.id, strain.id),
                    demand: activity.demand(location.id, strain),
                    prior: priors.get(&(location.id, strain.id)),
                    events: &active_events,
                };
                conditions.push(compute_condition(&inputs, &mut rng, now));
            }
        }

        // The store assigns the real id on commit
        let spawned = maybe_spawn_event(MarketEventId(0), &mut rng, now);
        let spawned = store.commit_market_tick(&conditions, spawned)?;

        let mut events = active_events;
        if let Some(event) = spawned {
            info!(event = %event.id, kind = ?event.kind, effect = event.price_effect, "market event started");
            self.events.publish(DomainEvent::MarketEventStarted {
                event: event.id,
                kind: event.kind,
                price_effect: event.price_effect,
                at: now,
            });
            events.push(event);
        }

        let (players, sales, growing) = activity.health_inputs();
        let snapshot = MarketSnapshot {
            conditions: store.market_conditions()?,
            events,
            health: market_health(players, sales, growing),
            updated_at: now,
        };
        info!(
            conditions = conditions.len(),
            health = snapshot.health,
            "market tick"
        );
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use growroom_core::genetics::generate_base_genetics;
    use growroom_core::market::{MarketEventKind, MAX_PRICE_MODIFIER, MIN_PRICE_MODIFIER};
    use growroom_core::{GameRng, GrowingLocation, ManualClock, MarketEvent};
    use growroom_db::Store;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 9, 0, 0).unwrap()
    }

    fn engine() -> (MarketEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(Store::in_memory().unwrap());
        let mut rng = GameRng::new(11);
        for id in 1..=3 {
            let genetics =
                generate_base_genetics(GeneticsId(id), format!("Strain {}", id), &mut rng, start());
            store.insert_genetics(&genetics).unwrap();
        }
        for (id, active) in [(1, true), (2, true), (3, false)] {
            store
                .save_location(&GrowingLocation {
                    id: LocationId(id),
                    name: format!("Site {}", id),
                    market_modifier: 1.0,
                    is_active: active,
                })
                .unwrap();
        }
        let ctx = SimContext::new(store, clock.clone(), rng, CoordinatorConfig::default());
        (MarketEngine::new(Arc::new(ctx), EventBus::default()), clock)
    }

    #[test]
    fn test_tick_covers_active_pairs_within_bounds() {
        let (engine, clock) = engine();
        for _ in 0..24 {
            let snapshot = engine.tick().unwrap();
            assert_eq!(snapshot.conditions.len(), 6);
            for condition in &snapshot.conditions {
                assert!(condition.price_modifier >= MIN_PRICE_MODIFIER);
                assert!(condition.price_modifier <= MAX_PRICE_MODIFIER);
                assert_ne!(condition.location, LocationId(3));
            }
            clock.advance(Duration::hours(1));
        }
        assert_eq!(engine.snapshot().updated_at, start() + Duration::hours(23));

        let history = engine
            .ctx
            .store
            .price_history(GeneticsId(1), Some(LocationId(1)), start())
            .unwrap();
        assert_eq!(history.len(), 24);
    }

    #[test]
    fn test_price_history_window_and_trend() {
        let (engine, clock) = engine();
        assert!(engine.price_history(GeneticsId(1), None, 7).unwrap().0.is_empty());

        for _ in 0..48 {
            engine.tick().unwrap();
            clock.advance(Duration::hours(1));
        }
        let (points, trend) = engine
            .price_history(GeneticsId(1), Some(LocationId(2)), 1)
            .unwrap();
        // Ticks at hours 24..=47 fall inside the last day
        assert_eq!(points.len(), 24);
        assert!(points.iter().all(|p| p.location == LocationId(2)));
        assert!(points.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
        let trend = trend.unwrap();
        assert_eq!(trend.first, points[0].price_modifier);
        assert_eq!(trend.last, points[23].price_modifier);

        let (both, _) = engine.price_history(GeneticsId(1), None, 7).unwrap();
        assert_eq!(both.len(), 96);

        assert!(engine.price_history(GeneticsId(1), None, 0).is_err());
        assert!(engine.price_history(GeneticsId(1), None, 31).is_err());
        assert!(engine.price_history(GeneticsId(99), None, 7).is_err());
    }

    #[test]
    fn test_tick_ends_expired_events() {
        let (engine, _) = engine();
        let mut rng = GameRng::new(3);
        let stale = MarketEvent::new(
            MarketEventId(40),
            MarketEventKind::SupplyShortage,
            None,
            &mut rng,
            start() - Duration::hours(30),
        );
        engine.ctx.store.insert_market_event(&stale).unwrap();

        let snapshot = engine.tick().unwrap();
        assert!(snapshot.events.iter().all(|e| e.id != MarketEventId(40)));
        let stored = engine
            .ctx
            .store
            .market_event(MarketEventId(40))
            .unwrap()
            .unwrap();
        assert!(!stored.is_active);
    }

    #[test]
    fn test_snapshot_before_first_tick_is_empty() {
        let (engine, _) = engine();
        let snapshot = engine.snapshot();
        assert!(snapshot.conditions.is_empty());
        assert_eq!(snapshot.updated_at, start());
    }
}
