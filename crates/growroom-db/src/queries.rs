//! Common query patterns for the database.

use crate::error::Result;
use crate::ledger::SaleRecord;
use crate::models::*;
use crate::store::{collect, Store};
use chrono::{DateTime, Duration, Utc};
use growroom_core::market::{DemandInputs, SupplyInputs};
use growroom_core::{Genetics, GeneticsId, LocationId, Plant, PlantStatus, PricePoint};
use std::collections::HashSet;

/// Harvests older than this no longer count toward supply.
pub const SUPPLY_WINDOW_DAYS: i64 = 30;
/// Growers idle for longer than this no longer count toward demand.
pub const DEMAND_WINDOW_DAYS: i64 = 7;
/// Sales older than this no longer count toward demand.
pub const SALES_WINDOW_DAYS: i64 = 14;
/// Plants this close to harvest count as pending supply.
const PENDING_HARVEST_HOURS: f64 = 7.0 * 24.0;

/// Plants and sales read once per market tick.
#[derive(Debug, Clone)]
pub struct MarketActivity {
    pub plants: Vec<Plant>,
    pub sales: Vec<SaleRecord>,
    pub now: DateTime<Utc>,
}

impl MarketActivity {
    fn at<'a>(
        &'a self,
        location: LocationId,
        strain: GeneticsId,
    ) -> impl Iterator<Item = &'a Plant> + 'a {
        self.plants
            .iter()
            .filter(move |p| p.location_id == location && p.genetics_id == strain)
    }

    pub fn supply(&self, location: LocationId, strain: GeneticsId) -> SupplyInputs {
        let since = self.now - Duration::days(SUPPLY_WINDOW_DAYS);
        let mut inputs = SupplyInputs::default();
        for plant in self.at(location, strain) {
            match plant.status {
                PlantStatus::Harvested | PlantStatus::Sold => {
                    if plant.harvested_at.is_some_and(|t| t >= since) {
                        inputs.recent_harvests += 1;
                        inputs.harvested_weight += plant.harvest_weight.unwrap_or(0.0);
                    }
                }
                PlantStatus::Growing if plant.hours_to_harvest() <= PENDING_HARVEST_HOURS => {
                    inputs.pending_harvests += 1;
                }
                _ => {}
            }
        }
        inputs
    }

    pub fn demand(&self, location: LocationId, strain: &Genetics) -> DemandInputs {
        let active_since = self.now - Duration::days(DEMAND_WINDOW_DAYS);
        let growers: HashSet<_> = self
            .plants
            .iter()
            .filter(|p| p.location_id == location && p.last_updated >= active_since)
            .map(|p| p.owner)
            .collect();
        let sales_since = self.now - Duration::days(SALES_WINDOW_DAYS);
        let recent_sales = self
            .sales
            .iter()
            .filter(|s| {
                s.location == location && s.strain == strain.id && s.sold_at >= sales_since
            })
            .count();
        DemandInputs::for_strain(strain, growers.len() as u32, recent_sales as u32)
    }

    /// Inputs for the overall market health score:
    /// (active players, sales in the last week, growing plants).
    pub fn health_inputs(&self) -> (u32, u32, u32) {
        let week_ago = self.now - Duration::days(7);
        let players: HashSet<_> = self
            .plants
            .iter()
            .filter(|p| p.last_updated >= week_ago)
            .map(|p| p.owner)
            .collect();
        let sales = self.sales.iter().filter(|s| s.sold_at >= week_ago).count();
        let growing = self.plants.iter().filter(|p| p.is_growing()).count();
        (players.len() as u32, sales as u32, growing as u32)
    }
}

impl Store {
    pub fn market_activity(&self, now: DateTime<Utc>) -> Result<MarketActivity> {
        Ok(MarketActivity {
            plants: self.all_plants()?,
            sales: self.sales()?,
            now,
        })
    }

    /// Price history for a strain since `since`, oldest first.
    pub fn price_history(
        &self,
        strain: GeneticsId,
        location: Option<LocationId>,
        since: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let r = self.db.r_transaction()?;
        let scan = r
            .scan()
            .secondary::<StoredPricePoint>(StoredPricePointKey::strain_id)?;
        let mut stored = collect(scan.start_with(strain.raw())?)?;
        stored.sort_by_key(|s| s.seq);
        let points = stored
            .iter()
            .map(StoredPricePoint::to_point)
            .collect::<Result<Vec<_>>>()?;
        Ok(points
            .into_iter()
            .filter(|p| p.recorded_at >= since)
            .filter(|p| location.map_or(true, |l| p.location == l))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use growroom_core::genetics::generate_base_genetics;
    use growroom_core::growth::HARVEST_AT;
    use growroom_core::{GameRng, PlantId, PlayerId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn plant(id: u64, owner: u64, status: PlantStatus) -> Plant {
        let mut plant = Plant::seed(
            PlantId(id),
            PlayerId(owner),
            GeneticsId(1),
            LocationId(1),
            now() - Duration::days(3),
        );
        plant.status = status;
        plant
    }

    #[test]
    fn test_supply_counts_recent_and_pending() {
        let mut recent = plant(1, 1, PlantStatus::Sold);
        recent.harvested_at = Some(now() - Duration::days(2));
        recent.harvest_weight = Some(80.0);
        let mut old = plant(2, 1, PlantStatus::Harvested);
        old.harvested_at = Some(now() - Duration::days(45));
        let mut ripe = plant(3, 2, PlantStatus::Growing);
        ripe.growth_points = HARVEST_AT - 10.0;
        let seedling = plant(4, 2, PlantStatus::Growing);

        let activity = MarketActivity {
            plants: vec![recent, old, ripe, seedling],
            sales: vec![],
            now: now(),
        };
        let supply = activity.supply(LocationId(1), GeneticsId(1));
        assert_eq!(supply.recent_harvests, 1);
        assert_eq!(supply.pending_harvests, 1);
        assert_eq!(supply.harvested_weight, 80.0);

        let elsewhere = activity.supply(LocationId(2), GeneticsId(1));
        assert_eq!(elsewhere, SupplyInputs::default());
    }

    #[test]
    fn test_demand_counts_distinct_growers_and_recent_sales() {
        let mut rng = GameRng::new(1);
        let strain = generate_base_genetics(GeneticsId(1), "Kush", &mut rng, now());
        let sale = |id: u64, days: i64| SaleRecord {
            id,
            seller: PlayerId(1),
            plant: PlantId(id),
            strain: GeneticsId(1),
            location: LocationId(1),
            weight: 50.0,
            price: 50,
            sold_at: now() - Duration::days(days),
        };
        let activity = MarketActivity {
            plants: vec![
                plant(1, 1, PlantStatus::Growing),
                plant(2, 1, PlantStatus::Growing),
                plant(3, 2, PlantStatus::Growing),
            ],
            sales: vec![sale(1, 1), sale(2, 20)],
            now: now(),
        };
        let demand = activity.demand(LocationId(1), &strain);
        assert_eq!(demand.active_growers, 2);
        assert_eq!(demand.recent_sales, 1);
        assert_eq!(activity.health_inputs(), (2, 1, 3));
    }
}
