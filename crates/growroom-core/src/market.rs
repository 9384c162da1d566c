//! Market dynamics engine
//!
//! Computes the price modifier for one (location, strain) pair. The store
//! gathers the supply and demand counts, this module turns them into a new
//! [`MarketCondition`]:
//!
//! 1. supply and demand levels (0-100)
//! 2. ratio and base modifier
//! 3. momentum blend with the prior modifier
//! 4. active market events and seasonality
//! 5. volatility noise
//! 6. clamp to [`MIN_PRICE_MODIFIER`, `MAX_PRICE_MODIFIER`]

use crate::genetics::{Genetics, GrowthPattern, Rarity};
use crate::identity::{GeneticsId, LocationId, MarketEventId};
use crate::rng::GameRng;
use crate::time::{hours, Season};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_PRICE_MODIFIER: f64 = 0.3;
pub const MAX_PRICE_MODIFIER: f64 = 3.0;
/// Probability per tick of a random market event
pub const EVENT_CHANCE: f64 = 0.05;
/// Fraction of the prior modifier kept on each recomputation
pub const MOMENTUM_RETENTION: f64 = 0.3;
pub const BASE_VOLATILITY: f64 = 0.1;
pub const MAX_VOLATILITY: f64 = 0.5;
/// Tokens per unit sold at a neutral market
pub const BASE_SALE_PRICE: f64 = 50.0;

/// A place plants are grown and sold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowingLocation {
    pub id: LocationId,
    pub name: String,
    /// Local price multiplier applied on sale
    pub market_modifier: f64,
    pub is_active: bool,
}

/// Harvest counts feeding the supply level
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SupplyInputs {
    /// Harvests in the last 30 days
    pub recent_harvests: u32,
    /// Plants expected to be harvested within 7 days
    pub pending_harvests: u32,
    /// Grams harvested in the last 30 days
    pub harvested_weight: f64,
}

impl SupplyInputs {
    pub fn level(&self) -> f64 {
        let harvested = 10.0 * self.recent_harvests as f64;
        let pending = 5.0 * self.pending_harvests as f64;
        let weight = (self.harvested_weight / 10.0).min(50.0);
        (harvested + pending + weight).min(100.0)
    }
}

/// Activity and strain traits feeding the demand level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandInputs {
    /// Distinct growers active at the location in the last 7 days
    pub active_growers: u32,
    /// Sales of the strain at the location in the last 14 days
    pub recent_sales: u32,
    pub rarity: Rarity,
    pub thc_max: f64,
    pub cbd_max: f64,
}

impl DemandInputs {
    pub fn for_strain(genetics: &Genetics, active_growers: u32, recent_sales: u32) -> Self {
        Self {
            active_growers,
            recent_sales,
            rarity: genetics.rarity,
            thc_max: genetics.thc.max,
            cbd_max: genetics.cbd.max,
        }
    }

    pub fn level(&self) -> f64 {
        let activity = (self.active_growers as f64 * 3.0).min(30.0);
        let sales = (self.recent_sales as f64 * 2.0).min(25.0);
        let potency = ((self.thc_max + self.cbd_max) / 2.0).min(15.0);
        (activity + sales + self.rarity.demand() + potency).min(100.0)
    }
}

pub fn supply_demand_ratio(supply: f64, demand: f64) -> f64 {
    if supply > 0.0 {
        demand / supply
    } else if demand > 0.0 {
        2.0
    } else {
        1.0
    }
}

pub fn base_modifier(ratio: f64) -> f64 {
    0.5 + ratio * 0.5
}

pub fn blend_momentum(base: f64, prior: Option<f64>) -> f64 {
    match prior {
        Some(prior) => base * (1.0 - MOMENTUM_RETENTION) + prior * MOMENTUM_RETENTION,
        None => base,
    }
}

pub fn volatility(strain_age_days: f64, player_bred: bool, active_events: usize) -> f64 {
    let mut v = BASE_VOLATILITY;
    if strain_age_days < 7.0 {
        v += 0.15;
    }
    if player_bred {
        v += 0.05;
    }
    v += 0.05 * active_events as f64;
    v.min(MAX_VOLATILITY)
}

/// Price multiplier for a growth pattern in a season
pub fn seasonal_modifier(pattern: GrowthPattern, season: Season) -> f64 {
    use GrowthPattern::*;
    match (season, pattern) {
        (Season::Spring, Sativa) => 1.1,
        (Season::Spring, Hybrid) => 1.05,
        (Season::Summer, Sativa) => 1.15,
        (Season::Fall, Indica) => 1.1,
        (Season::Fall, Hybrid) => 1.05,
        (Season::Winter, Indica) => 1.15,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketEventKind {
    SupplyShortage,
    HighDemand,
    MarketCrash,
    QualityPremium,
    RegulatoryNews,
}

impl MarketEventKind {
    pub const ALL: [MarketEventKind; 5] = [
        MarketEventKind::SupplyShortage,
        MarketEventKind::HighDemand,
        MarketEventKind::MarketCrash,
        MarketEventKind::QualityPremium,
        MarketEventKind::RegulatoryNews,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            MarketEventKind::SupplyShortage => "Supply shortage causes price spike",
            MarketEventKind::HighDemand => "Celebrity endorsement increases demand",
            MarketEventKind::MarketCrash => "Market oversaturation causes prices to drop",
            MarketEventKind::QualityPremium => "High-quality strains command premium prices",
            MarketEventKind::RegulatoryNews => "Regulatory changes affect market sentiment",
        }
    }

    pub fn duration_hours(&self) -> f64 {
        match self {
            MarketEventKind::SupplyShortage => 6.0,
            MarketEventKind::HighDemand => 12.0,
            MarketEventKind::MarketCrash => 8.0,
            MarketEventKind::QualityPremium => 4.0,
            MarketEventKind::RegulatoryNews => 24.0,
        }
    }

    /// Regulatory news swings either way
    pub fn price_effect(&self, rng: &mut GameRng) -> f64 {
        match self {
            MarketEventKind::SupplyShortage => 1.3,
            MarketEventKind::HighDemand => 1.2,
            MarketEventKind::MarketCrash => 0.7,
            MarketEventKind::QualityPremium => 1.4,
            MarketEventKind::RegulatoryNews => rng.uniform(0.8, 1.2),
        }
    }
}

impl fmt::Display for MarketEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketEventKind::SupplyShortage => "supply_shortage",
            MarketEventKind::HighDemand => "high_demand",
            MarketEventKind::MarketCrash => "market_crash",
            MarketEventKind::QualityPremium => "quality_premium",
            MarketEventKind::RegulatoryNews => "regulatory_news",
        };
        write!(f, "{}", name)
    }
}

/// A time-bounded price shock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: MarketEventId,
    pub kind: MarketEventKind,
    pub description: String,
    pub price_effect: f64,
    /// `None` applies to every strain
    pub strain: Option<GeneticsId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
}

impl MarketEvent {
    pub fn new(
        id: MarketEventId,
        kind: MarketEventKind,
        strain: Option<GeneticsId>,
        rng: &mut GameRng,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            description: kind.description().to_string(),
            price_effect: kind.price_effect(rng),
            strain,
            start_time: now,
            end_time: now + hours(kind.duration_hours()),
            is_active: true,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time <= now && self.end_time > now
    }

    pub fn applies_to(&self, strain: GeneticsId) -> bool {
        self.strain.map_or(true, |s| s == strain)
    }
}

/// Roll the per-tick event chance; on a hit pick a catalogue entry
pub fn maybe_spawn_event(
    id: MarketEventId,
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> Option<MarketEvent> {
    if !rng.chance(EVENT_CHANCE) {
        return None;
    }
    let kind = rng.pick(&MarketEventKind::ALL).copied()?;
    Some(MarketEvent::new(id, kind, None, rng, now))
}

/// Product of the active events touching `strain`, and how many there were
pub fn event_multiplier(
    events: &[MarketEvent],
    strain: GeneticsId,
    now: DateTime<Utc>,
) -> (f64, usize) {
    events
        .iter()
        .filter(|e| e.is_active_at(now) && e.applies_to(strain))
        .fold((1.0, 0), |(product, count), e| {
            (product * e.price_effect, count + 1)
        })
}

/// Current price-affecting state of one (location, strain) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCondition {
    pub location: LocationId,
    pub strain: GeneticsId,
    pub supply_level: f64,
    pub demand_level: f64,
    pub price_modifier: f64,
    pub volatility: f64,
    pub updated_at: DateTime<Utc>,
}

/// One immutable price-history ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub location: LocationId,
    pub strain: GeneticsId,
    pub price_modifier: f64,
    pub supply_level: f64,
    pub demand_level: f64,
    pub volatility: f64,
    pub recorded_at: DateTime<Utc>,
}

impl From<&MarketCondition> for PricePoint {
    fn from(c: &MarketCondition) -> Self {
        Self {
            location: c.location,
            strain: c.strain,
            price_modifier: c.price_modifier,
            supply_level: c.supply_level,
            demand_level: c.demand_level,
            volatility: c.volatility,
            recorded_at: c.updated_at,
        }
    }
}

/// Everything needed to recompute one pair
#[derive(Debug, Clone)]
pub struct MarketInputs<'a> {
    pub location: LocationId,
    pub strain: &'a Genetics,
    pub supply: SupplyInputs,
    pub demand: DemandInputs,
    pub prior: Option<&'a MarketCondition>,
    pub events: &'a [MarketEvent],
}

pub fn compute_condition(
    inputs: &MarketInputs<'_>,
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> MarketCondition {
    let supply = inputs.supply.level();
    let demand = inputs.demand.level();
    let base = base_modifier(supply_demand_ratio(supply, demand));
    let mut modifier = blend_momentum(base, inputs.prior.map(|p| p.price_modifier));

    let (events, active_events) = event_multiplier(inputs.events, inputs.strain.id, now);
    modifier *= events;
    modifier *= seasonal_modifier(inputs.strain.growth_pattern, Season::at(now));

    let volatility = volatility(
        inputs.strain.age_days(now),
        inputs.strain.is_player_bred(),
        active_events,
    );
    modifier *= 1.0 + rng.uniform(-0.1, 0.1) * volatility;

    MarketCondition {
        location: inputs.location,
        strain: inputs.strain.id,
        supply_level: supply,
        demand_level: demand,
        price_modifier: modifier.clamp(MIN_PRICE_MODIFIER, MAX_PRICE_MODIFIER),
        volatility,
        updated_at: now,
    }
}

/// Overall market activity score (0-100)
pub fn market_health(active_players: u32, sales_last_week: u32, growing_plants: u32) -> f64 {
    let players = (active_players as f64).min(30.0);
    let sales = (sales_last_week as f64).min(25.0);
    let plants = (growing_plants as f64 / 2.0).min(25.0);
    (players + sales + plants + 20.0).min(100.0)
}

/// Tokens paid for one harvest
pub fn sale_price(price_modifier: f64, location_modifier: f64) -> u64 {
    (BASE_SALE_PRICE * price_modifier * location_modifier)
        .round()
        .max(0.0) as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    pub first: f64,
    pub last: f64,
    pub change: f64,
}

impl PriceTrend {
    pub fn is_rising(&self) -> bool {
        self.change > 0.0
    }
}

/// Trend across a chronologically ordered slice of history
pub fn trend(history: &[PricePoint]) -> Option<PriceTrend> {
    let first = history.first()?.price_modifier;
    let last = history.last()?.price_modifier;
    Some(PriceTrend {
        first,
        last,
        change: last - first,
    })
}
