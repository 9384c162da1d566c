//! Genetics model: base strain generation and crossbreeding
//!
//! A [`Genetics`] record is immutable once created. Breeding never touches
//! either parent; a successful cross produces a brand new record whose
//! generation is one past the older parent's.

use crate::error::{Error, Result};
use crate::identity::{GeneticsId, PlayerId};
use crate::rng::GameRng;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Lowest success probability a cross can have, in percent
pub const MIN_SUCCESS_PROBABILITY: f64 = 5.0;
/// Highest success probability a cross can have, in percent
pub const MAX_SUCCESS_PROBABILITY: f64 = 85.0;
/// Bonus for crossing plants from the same family
pub const FAMILY_BONUS: f64 = 10.0;

const STRAIN_PREFIXES: &[&str] = &[
    "Purple", "Northern", "Blue", "Golden", "Sour", "Lemon", "Cosmic", "Midnight", "Cherry",
    "Emerald",
];
const STRAIN_SUFFIXES: &[&str] = &[
    "Kush", "Haze", "Dream", "Diesel", "Skunk", "Lights", "Glue", "Cookies", "Widow", "Cake",
];

/// Ordered rarity tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    /// Zero-based tier index
    pub fn tier(self) -> u8 {
        self as u8
    }

    /// Rarity for a tier index, clamped into the valid range
    pub fn from_tier(tier: i32) -> Self {
        Self::ALL[tier.clamp(0, 4) as usize]
    }

    /// Penalty this tier adds to a cross's success probability
    pub fn breeding_cost(self) -> f64 {
        match self {
            Rarity::Common => 0.0,
            Rarity::Uncommon => 2.0,
            Rarity::Rare => 5.0,
            Rarity::Epic => 8.0,
            Rarity::Legendary => 12.0,
        }
    }

    /// Fixed demand contribution used by the market
    pub fn demand(self) -> f64 {
        match self {
            Rarity::Common => 10.0,
            Rarity::Uncommon => 15.0,
            Rarity::Rare => 20.0,
            Rarity::Epic => 30.0,
            Rarity::Legendary => 40.0,
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        };
        write!(f, "{}", name)
    }
}

/// Inclusive numeric trait range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraitRange {
    pub min: f64,
    pub max: f64,
}

impl TraitRange {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Element-wise average of two ranges
    pub fn average(a: &TraitRange, b: &TraitRange) -> Self {
        Self::new((a.min + b.min) / 2.0, (a.max + b.max) / 2.0)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.min * factor, self.max * factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthPattern {
    Indica,
    Sativa,
    Hybrid,
    Autoflower,
    Ruderalis,
}

impl GrowthPattern {
    pub const ALL: [GrowthPattern; 5] = [
        GrowthPattern::Indica,
        GrowthPattern::Sativa,
        GrowthPattern::Hybrid,
        GrowthPattern::Autoflower,
        GrowthPattern::Ruderalis,
    ];
}

impl fmt::Display for GrowthPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrowthPattern::Indica => "indica",
            GrowthPattern::Sativa => "sativa",
            GrowthPattern::Hybrid => "hybrid",
            GrowthPattern::Autoflower => "autoflower",
            GrowthPattern::Ruderalis => "ruderalis",
        };
        write!(f, "{}", name)
    }
}

/// Conditions a strain prefers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimatePreference {
    /// Fahrenheit
    pub temperature_min: f64,
    pub temperature_max: f64,
    /// Relative humidity, percent
    pub humidity: f64,
    /// PPFD
    pub light_intensity: f64,
    pub co2_responsiveness: f64,
}

impl ClimatePreference {
    /// Midpoint of the preferred temperature range
    pub fn optimal_temperature(&self) -> f64 {
        (self.temperature_min + self.temperature_max) / 2.0
    }

    fn average(a: &Self, b: &Self) -> Self {
        Self {
            temperature_min: (a.temperature_min + b.temperature_min) / 2.0,
            temperature_max: (a.temperature_max + b.temperature_max) / 2.0,
            humidity: (a.humidity + b.humidity) / 2.0,
            light_intensity: (a.light_intensity + b.light_intensity) / 2.0,
            co2_responsiveness: (a.co2_responsiveness + b.co2_responsiveness) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pigment {
    Green,
    Purple,
    Orange,
    Red,
    Yellow,
    Pink,
}

const PIGMENTS: [Pigment; 6] = [
    Pigment::Green,
    Pigment::Purple,
    Pigment::Orange,
    Pigment::Red,
    Pigment::Yellow,
    Pigment::Pink,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Recessive,
    Dominant,
    CoDominant,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub primary: Pigment,
    pub secondary: Pigment,
    pub expression: Expression,
    /// 0.2 - 1.0
    pub intensity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CannabinoidProfile {
    pub thc_dominant: bool,
    /// THC:CBD ratio
    pub cbd_ratio: f64,
    pub cbg: f64,
    pub cbc: f64,
    pub cbn: f64,
    pub thcv: f64,
    pub entourage: f64,
}

impl CannabinoidProfile {
    fn average(a: &Self, b: &Self, thc_dominant: bool) -> Self {
        Self {
            thc_dominant,
            cbd_ratio: (a.cbd_ratio + b.cbd_ratio) / 2.0,
            cbg: (a.cbg + b.cbg) / 2.0,
            cbc: (a.cbc + b.cbc) / 2.0,
            cbn: (a.cbn + b.cbn) / 2.0,
            thcv: (a.thcv + b.thcv) / 2.0,
            entourage: (a.entourage + b.entourage) / 2.0,
        }
    }
}

/// An immutable strain definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genetics {
    pub id: GeneticsId,
    pub name: String,
    pub description: String,
    /// Percent
    pub thc: TraitRange,
    /// Percent
    pub cbd: TraitRange,
    pub flowering_weeks: TraitRange,
    pub yield_grams: TraitRange,
    pub stability: f64,
    pub vigor: f64,
    pub disease_resistance: f64,
    pub environmental_adaptation: f64,
    pub stress_tolerance: f64,
    pub rarity: Rarity,
    pub generation: u32,
    pub parent1: Option<GeneticsId>,
    pub parent2: Option<GeneticsId>,
    pub growth_pattern: GrowthPattern,
    pub climate: ClimatePreference,
    pub color: ColorProfile,
    pub cannabinoids: CannabinoidProfile,
    /// Set when a player produced this strain by crossing
    pub bred_by: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

impl Genetics {
    pub fn is_player_bred(&self) -> bool {
        self.bred_by.is_some()
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds() as f64 / 86_400.0
    }

    pub fn parents(&self) -> impl Iterator<Item = GeneticsId> + '_ {
        self.parent1.iter().chain(self.parent2.iter()).copied()
    }

    /// Same strain, a shared parent, or one is the other's parent
    pub fn shares_lineage(&self, other: &Genetics) -> bool {
        if self.id == other.id {
            return true;
        }
        if self.parents().any(|p| p == other.id) || other.parents().any(|p| p == self.id) {
            return true;
        }
        self.parents().any(|p| other.parents().any(|q| p == q))
    }
}

/// Pick a strain name from the fixed name pools
pub fn random_strain_name(rng: &mut GameRng) -> String {
    let prefix = rng.pick(STRAIN_PREFIXES).copied().unwrap_or("Wild");
    let suffix = rng.pick(STRAIN_SUFFIXES).copied().unwrap_or("Kush");
    format!("{} {}", prefix, suffix)
}

/// Generate a generation-zero strain with randomized traits
pub fn generate_base_genetics(
    id: GeneticsId,
    name: impl Into<String>,
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> Genetics {
    let name = name.into();

    let thc_min = rng.uniform(15.0, 20.0);
    let thc = TraitRange::new(thc_min, (thc_min + rng.uniform(3.0, 8.0)).min(25.0));
    let cbd_min = rng.uniform(0.1, 1.0);
    let cbd = TraitRange::new(cbd_min, (cbd_min + rng.uniform(0.2, 1.0)).min(2.0));
    let flowering_min = rng.range_i64(8, 10) as f64;
    let flowering_weeks =
        TraitRange::new(flowering_min, flowering_min + rng.range_i64(1, 2) as f64);
    let yield_min = rng.uniform(300.0, 450.0);
    let yield_grams = TraitRange::new(yield_min, yield_min + rng.uniform(50.0, 150.0));

    let growth_pattern = rng
        .pick(&GrowthPattern::ALL)
        .copied()
        .unwrap_or(GrowthPattern::Hybrid);

    let climate = ClimatePreference {
        temperature_min: rng.range_i64(65, 75) as f64,
        temperature_max: rng.range_i64(78, 85) as f64,
        humidity: rng.range_i64(40, 60) as f64,
        light_intensity: rng.range_i64(600, 1200) as f64,
        co2_responsiveness: rng.uniform(0.5, 1.0),
    };

    let color = ColorProfile {
        primary: rng.pick(&PIGMENTS).copied().unwrap_or(Pigment::Green),
        secondary: rng.pick(&PIGMENTS).copied().unwrap_or(Pigment::Green),
        expression: *rng
            .pick(&[Expression::Recessive, Expression::Dominant, Expression::CoDominant])
            .unwrap_or(&Expression::Dominant),
        intensity: rng.uniform(0.2, 1.0),
    };

    let cannabinoids = CannabinoidProfile {
        thc_dominant: rng.coin_flip(),
        cbd_ratio: rng.range_i64(1, 20) as f64,
        cbg: rng.uniform(0.0, 3.0),
        cbc: rng.uniform(0.0, 1.5),
        cbn: rng.uniform(0.0, 1.0),
        thcv: rng.uniform(0.0, 2.0),
        entourage: rng.uniform(0.5, 1.0),
    };

    Genetics {
        id,
        description: format!("A {} landrace", growth_pattern),
        name,
        thc,
        cbd,
        flowering_weeks,
        yield_grams,
        stability: rng.uniform(0.5, 0.9),
        vigor: rng.uniform(0.5, 0.9),
        disease_resistance: 0.5,
        environmental_adaptation: 0.5,
        stress_tolerance: rng.uniform(0.3, 0.9),
        rarity: Rarity::Common,
        generation: 0,
        parent1: None,
        parent2: None,
        growth_pattern,
        climate,
        color,
        cannabinoids,
        bred_by: None,
        created_at: now,
    }
}

/// The player attempting a cross
#[derive(Debug, Clone)]
pub struct Breeder {
    pub player: PlayerId,
    pub level: u32,
    /// Genetics the player currently owns
    pub owned: HashSet<GeneticsId>,
}

/// Success probability of crossing two strains, in percent
pub fn success_probability(parent1: &Genetics, parent2: &Genetics, breeder_level: u32) -> f64 {
    let stability = (parent1.stability + parent2.stability) / 2.0 * 30.0;
    let level = breeder_level as f64 * 2.0;
    let family = if parent1.shares_lineage(parent2) {
        FAMILY_BONUS
    } else {
        0.0
    };
    let generation_penalty = 3.0 * parent1.generation.max(parent2.generation) as f64;
    let rarity_penalty = parent1.rarity.breeding_cost() + parent2.rarity.breeding_cost();

    (50.0 + stability + level + family - generation_penalty - rarity_penalty)
        .clamp(MIN_SUCCESS_PROBABILITY, MAX_SUCCESS_PROBABILITY)
}

/// Experience and currency awarded for a successful cross
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedingReward {
    pub experience: u64,
    pub currency: u64,
}

impl BreedingReward {
    pub fn for_rarity(rarity: Rarity) -> Self {
        let scale = rarity.tier() as u64 + 1;
        Self {
            experience: 50 * scale,
            currency: 25 * scale,
        }
    }
}

/// Result of a breeding attempt
///
/// A failed roll is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum BreedOutcome {
    Success {
        offspring: Box<Genetics>,
        success_probability: f64,
        reward: BreedingReward,
    },
    Failure {
        success_probability: f64,
        roll: f64,
    },
}

impl BreedOutcome {
    pub fn success_probability(&self) -> f64 {
        match self {
            BreedOutcome::Success {
                success_probability,
                ..
            }
            | BreedOutcome::Failure {
                success_probability,
                ..
            } => *success_probability,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BreedOutcome::Success { .. })
    }
}

/// Attempt to cross two strains
///
/// `offspring_id` is only used when the roll succeeds. Persisting the
/// offspring, granting ownership and paying out the reward is left to the
/// caller so it can happen in one transaction.
pub fn breed(
    parent1: &Genetics,
    parent2: &Genetics,
    breeder: &Breeder,
    offspring_id: GeneticsId,
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> Result<BreedOutcome> {
    for parent in [parent1, parent2] {
        if !breeder.owned.contains(&parent.id) {
            return Err(Error::ownership("genetics", parent.id, breeder.player));
        }
    }

    let probability = success_probability(parent1, parent2, breeder.level);
    let roll = rng.uniform(0.0, 100.0);
    if roll > probability {
        return Ok(BreedOutcome::Failure {
            success_probability: probability,
            roll,
        });
    }

    let offspring = cross(parent1, parent2, breeder.player, offspring_id, rng, now);
    let reward = BreedingReward::for_rarity(offspring.rarity);
    Ok(BreedOutcome::Success {
        offspring: Box::new(offspring),
        success_probability: probability,
        reward,
    })
}

fn cross(
    p1: &Genetics,
    p2: &Genetics,
    breeder: PlayerId,
    id: GeneticsId,
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> Genetics {
    let generation = p1.generation.max(p2.generation) + 1;

    let thc = TraitRange::average(&p1.thc, &p2.thc).scaled(rng.uniform(0.9, 1.1));
    let cbd = TraitRange::average(&p1.cbd, &p2.cbd).scaled(rng.uniform(0.9, 1.1));
    let flowering = TraitRange::average(&p1.flowering_weeks, &p2.flowering_weeks)
        .scaled(rng.uniform(0.95, 1.05));
    let flowering_weeks = TraitRange::new(flowering.min.floor(), flowering.max.ceil());
    let yield_grams =
        TraitRange::average(&p1.yield_grams, &p2.yield_grams).scaled(rng.uniform(0.9, 1.15));

    let stability = mean(p1.stability, p2.stability) * rng.uniform(0.8, 1.2);
    let vigor = mean(p1.vigor, p2.vigor) * rng.uniform(0.9, 1.1);
    let disease_resistance =
        mean(p1.disease_resistance, p2.disease_resistance) * rng.uniform(0.9, 1.1);
    let environmental_adaptation =
        mean(p1.environmental_adaptation, p2.environmental_adaptation) * rng.uniform(0.9, 1.1);
    let stress_tolerance = mean(p1.stress_tolerance, p2.stress_tolerance) * rng.uniform(0.9, 1.1);

    let rarity = offspring_rarity(p1.rarity, p2.rarity, rng);

    let growth_pattern = if p1.growth_pattern == p2.growth_pattern {
        p1.growth_pattern
    } else if rng.chance(0.5) {
        GrowthPattern::Hybrid
    } else if rng.coin_flip() {
        p1.growth_pattern
    } else {
        p2.growth_pattern
    };

    let color_parent = if rng.coin_flip() { p1 } else { p2 };
    let color = ColorProfile {
        intensity: mean(p1.color.intensity, p2.color.intensity),
        ..color_parent.color
    };
    let thc_dominant = if rng.coin_flip() {
        p1.cannabinoids.thc_dominant
    } else {
        p2.cannabinoids.thc_dominant
    };

    Genetics {
        id,
        name: offspring_name(p1, p2, generation),
        description: format!(
            "Generation {} cross of {} and {}",
            generation, p1.name, p2.name
        ),
        thc,
        cbd,
        flowering_weeks,
        yield_grams,
        stability: stability.clamp(0.1, 1.0),
        vigor: vigor.clamp(0.1, 1.0),
        disease_resistance: disease_resistance.clamp(0.0, 1.0),
        environmental_adaptation: environmental_adaptation.clamp(0.0, 1.0),
        stress_tolerance: stress_tolerance.clamp(0.0, 1.0),
        rarity,
        generation,
        parent1: Some(p1.id),
        parent2: Some(p2.id),
        growth_pattern,
        climate: ClimatePreference::average(&p1.climate, &p2.climate),
        color,
        cannabinoids: CannabinoidProfile::average(&p1.cannabinoids, &p2.cannabinoids, thc_dominant),
        bred_by: Some(breeder),
        created_at: now,
    }
}

fn mean(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

/// Rounded average tier, 10% chance of +1 and 5% chance of -1
fn offspring_rarity(a: Rarity, b: Rarity, rng: &mut GameRng) -> Rarity {
    let base = ((a.tier() as f64 + b.tier() as f64) / 2.0).round() as i32;
    let roll = rng.next_f64();
    let shift = if roll < 0.10 {
        1
    } else if roll < 0.15 {
        -1
    } else {
        0
    };
    Rarity::from_tier(base + shift)
}

fn offspring_name(p1: &Genetics, p2: &Genetics, generation: u32) -> String {
    if p1.id == p2.id {
        return format!("{} S{}", p1.name, generation);
    }
    let head = p1.name.split_whitespace().next().unwrap_or(&p1.name);
    let tail = p2.name.split_whitespace().last().unwrap_or(&p2.name);
    if head == tail {
        format!("{} F{}", head, generation)
    } else {
        format!("{} {}", head, tail)
    }
}

/// Level of a player's breeding lab from the number of strains they have bred
pub fn breeding_lab_level(strains_bred: usize) -> u32 {
    (strains_bred / 5 + 1).min(10) as u32
}
