//! Growth simulation
//!
//! A plant moves through seedling → vegetative → flowering → harvest purely
//! on accumulated growth points. Stages never regress, points never decrease
//! and health is always kept in [0, 100].

use crate::error::{Error, Result};
use crate::genetics::Genetics;
use crate::identity::{GeneticsId, LocationId, PlantId, PlayerId};
use crate::rng::GameRng;
use crate::weather::{apply_to_growth_with_risk, Disease, WeatherEffect, WeatherImpact};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VEGETATIVE_AT: f64 = 100.0;
pub const FLOWERING_AT: f64 = 500.0;
pub const HARVEST_AT: f64 = 800.0;

/// Factors below this count as unfit and cost health
const FITNESS_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    Vegetative,
    Flowering,
    Harvest,
}

impl GrowthStage {
    /// Growth points per hour at a perfect environment
    pub fn base_rate(&self) -> f64 {
        match self {
            GrowthStage::Seedling => 2.0,
            GrowthStage::Vegetative => 4.0,
            GrowthStage::Flowering => 1.5,
            GrowthStage::Harvest => 0.0,
        }
    }

    pub fn optimal_light_hours(&self) -> f64 {
        match self {
            GrowthStage::Seedling => 14.0,
            GrowthStage::Vegetative => 18.0,
            GrowthStage::Flowering => 12.0,
            GrowthStage::Harvest => 16.0,
        }
    }

    pub fn for_points(points: f64) -> Self {
        if points < VEGETATIVE_AT {
            GrowthStage::Seedling
        } else if points < FLOWERING_AT {
            GrowthStage::Vegetative
        } else if points < HARVEST_AT {
            GrowthStage::Flowering
        } else {
            GrowthStage::Harvest
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GrowthStage::Seedling => "seedling",
            GrowthStage::Vegetative => "vegetative",
            GrowthStage::Flowering => "flowering",
            GrowthStage::Harvest => "harvest",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NutrientLevel {
    Deficient,
    Low,
    #[default]
    Balanced,
    High,
    Excess,
}

impl NutrientLevel {
    pub fn factor(&self) -> f64 {
        match self {
            NutrientLevel::Deficient => 0.6,
            NutrientLevel::Low => 0.8,
            NutrientLevel::Balanced => 1.0,
            NutrientLevel::High => 0.9,
            NutrientLevel::Excess => 0.7,
        }
    }

    /// Level after one feeding
    pub fn fed(&self) -> Self {
        match self {
            NutrientLevel::Deficient => NutrientLevel::Low,
            NutrientLevel::Low => NutrientLevel::Balanced,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AirCirculation {
    Poor,
    Fair,
    #[default]
    Good,
}

/// Conditions a plant is grown under
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Fahrenheit
    pub temperature: f64,
    /// Percent
    pub humidity: f64,
    pub light_hours: f64,
    pub co2_ppm: f64,
    pub nutrients: NutrientLevel,
    pub ph: f64,
    pub air_circulation: AirCirculation,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            temperature: 75.0,
            humidity: 55.0,
            light_hours: 18.0,
            co2_ppm: 400.0,
            nutrients: NutrientLevel::Balanced,
            ph: 6.5,
            air_circulation: AirCirculation::Good,
        }
    }
}

impl Environment {
    /// The environment as shifted by active weather
    pub fn under_weather(&self, impact: &WeatherImpact) -> Self {
        Self {
            temperature: self.temperature + impact.temperature_shift,
            humidity: (self.humidity + impact.humidity_shift).clamp(0.0, 100.0),
            light_hours: (self.light_hours * (1.0 + impact.light_shift / 100.0)).clamp(0.0, 24.0),
            ..*self
        }
    }
}

/// Per-factor fitness in (0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthFactors {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub nutrients: f64,
    pub genetics: f64,
    pub overall: f64,
    /// Health change per hour
    pub health_change: f64,
    /// The strain's preferred temperature the factor was scored against
    pub target_temperature: f64,
    pub target_humidity: f64,
}

impl GrowthFactors {
    /// Fitness of `env` for a strain at `stage`, scored against the strain's
    /// own climate preference
    pub fn compute(env: &Environment, stage: GrowthStage, genetics: &Genetics) -> Self {
        let target_temperature = genetics.climate.optimal_temperature();
        let target_humidity = genetics.climate.humidity;
        let temperature = (1.0 - (env.temperature - target_temperature).abs() * 0.02).max(0.3);
        let humidity = (1.0 - (env.humidity - target_humidity).abs() * 0.015).max(0.4);
        let light = (1.0 - (env.light_hours - stage.optimal_light_hours()).abs() * 0.05).max(0.5);
        let nutrients = env.nutrients.factor();
        let genetics = genetics.environmental_adaptation;

        let overall = temperature * 0.25
            + humidity * 0.2
            + light * 0.25
            + nutrients * 0.2
            + genetics * 0.1;
        let unfit = [temperature, humidity, light, nutrients]
            .iter()
            .filter(|&&f| f < FITNESS_THRESHOLD)
            .count();

        Self {
            temperature,
            humidity,
            light,
            nutrients,
            genetics,
            overall,
            health_change: -2.0 * unfit as f64,
            target_temperature,
            target_humidity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlantStatus {
    Growing,
    Harvested,
    Sold,
    Dead,
}

/// A live cultivation instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub owner: PlayerId,
    pub genetics_id: GeneticsId,
    pub location_id: LocationId,
    pub stage: GrowthStage,
    pub growth_points: f64,
    pub health: f64,
    pub stress_level: f64,
    pub disease_risk: f64,
    pub nutrients: NutrientLevel,
    pub status: PlantStatus,
    pub diseases: Vec<Disease>,
    pub planted_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub harvested_at: Option<DateTime<Utc>>,
    /// Grams, set on harvest
    pub harvest_weight: Option<f64>,
    /// Bumped on every stored write
    pub version: u64,
}

impl Plant {
    pub fn seed(
        id: PlantId,
        owner: PlayerId,
        genetics_id: GeneticsId,
        location_id: LocationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            genetics_id,
            location_id,
            stage: GrowthStage::Seedling,
            growth_points: 0.0,
            health: 100.0,
            stress_level: 0.0,
            disease_risk: 0.0,
            nutrients: NutrientLevel::Balanced,
            status: PlantStatus::Growing,
            diseases: Vec::new(),
            planted_at: now,
            last_updated: now,
            harvested_at: None,
            harvest_weight: None,
            version: 0,
        }
    }

    pub fn is_growing(&self) -> bool {
        self.status == PlantStatus::Growing
    }

    /// Hours until harvest at ideal conditions; zero once mature
    pub fn hours_to_harvest(&self) -> f64 {
        let mut points = self.growth_points;
        let mut hours = 0.0;
        for (stage, until) in [
            (GrowthStage::Seedling, VEGETATIVE_AT),
            (GrowthStage::Vegetative, FLOWERING_AT),
            (GrowthStage::Flowering, HARVEST_AT),
        ] {
            if points < until {
                hours += (until - points) / stage.base_rate();
                points = until;
            }
        }
        hours
    }

    /// The managed grow-room environment before weather. The room is held
    /// at the strain's preferred climate.
    pub fn environment(&self, genetics: &Genetics) -> Environment {
        Environment {
            temperature: genetics.climate.optimal_temperature(),
            humidity: genetics.climate.humidity,
            nutrients: self.nutrients,
            light_hours: self.stage.optimal_light_hours(),
            ..Environment::default()
        }
    }

    fn ensure_growing(&self) -> Result<()> {
        if self.is_growing() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "{} is no longer growing ({:?})",
                self.id, self.status
            )))
        }
    }

    pub fn water(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_growing()?;
        self.health = (self.health + 5.0).min(100.0);
        self.stress_level = (self.stress_level - 5.0).max(0.0);
        self.last_updated = now;
        Ok(())
    }

    pub fn fertilize(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_growing()?;
        self.nutrients = self.nutrients.fed();
        self.last_updated = now;
        Ok(())
    }

    /// Harvest a mature plant, returning the weight in grams
    pub fn harvest(
        &mut self,
        genetics: &Genetics,
        weather: &[WeatherEffect],
        now: DateTime<Utc>,
    ) -> Result<f64> {
        self.ensure_growing()?;
        if self.stage != GrowthStage::Harvest {
            return Err(Error::validation(format!(
                "{} is not ready to harvest (stage {})",
                self.id, self.stage
            )));
        }
        let impact = WeatherImpact::fold(weather);
        let weight =
            genetics.yield_grams.midpoint() * (self.health / 100.0) * impact.yield_multiplier;
        self.status = PlantStatus::Harvested;
        self.harvested_at = Some(now);
        self.harvest_weight = Some(weight);
        self.last_updated = now;
        Ok(weight)
    }
}

/// What one call to [`advance`] did
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthReport {
    pub previous_stage: GrowthStage,
    pub stage: GrowthStage,
    pub growth_gained: f64,
    pub health_delta: f64,
    pub factors: GrowthFactors,
    pub weather: Option<WeatherImpact>,
    pub disease: Option<Disease>,
    pub died: bool,
}

impl GrowthReport {
    pub fn stage_changed(&self) -> bool {
        self.stage != self.previous_stage
    }
}

/// Advance a plant by `hours` of growth
///
/// `weather` holds the currently active effects; pass an empty slice for
/// indoor or weatherless growth.
pub fn advance(
    plant: &mut Plant,
    genetics: &Genetics,
    hours: f64,
    env: &Environment,
    weather: &[WeatherEffect],
    rng: &mut GameRng,
    now: DateTime<Utc>,
) -> Result<GrowthReport> {
    plant.ensure_growing()?;
    if !hours.is_finite() || hours < 0.0 {
        return Err(Error::validation(format!(
            "elapsed hours must be non-negative, got {}",
            hours
        )));
    }
    if genetics.id != plant.genetics_id {
        return Err(Error::validation(format!(
            "{} does not belong to {}",
            genetics.id, plant.id
        )));
    }

    let previous_stage = plant.stage;
    let effective = if weather.is_empty() {
        *env
    } else {
        env.under_weather(&WeatherImpact::fold(weather))
    };
    let factors = GrowthFactors::compute(&effective, plant.stage, genetics);

    plant.stress_level = stress_level(&effective, plant.health, genetics);
    plant.disease_risk = disease_risk(&effective, plant.stress_level, genetics);

    let mut rate = plant.stage.base_rate() * factors.overall;
    let mut weather_impact = None;
    let mut disease = None;
    let mut health_delta = factors.health_change * hours;

    if !weather.is_empty() {
        let adjustment =
            apply_to_growth_with_risk(weather, rate, plant.disease_risk / 100.0, rng);
        rate = adjustment.adjusted_rate;
        health_delta -= adjustment.health_penalty();
        weather_impact = Some(adjustment.impact);
        disease = adjustment.disease.map(|kind| Disease {
            kind,
            health_penalty: adjustment.health_penalty(),
            contracted_at: now,
        });
    }

    let gained = (rate * hours).max(0.0);
    plant.growth_points += gained;
    plant.stage = plant.stage.max(GrowthStage::for_points(plant.growth_points));

    let before = plant.health;
    plant.health = (plant.health + health_delta).clamp(0.0, 100.0);
    if let Some(d) = &disease {
        plant.diseases.push(d.clone());
    }
    let died = plant.health <= 0.0;
    if died {
        plant.status = PlantStatus::Dead;
    }
    plant.last_updated = now;

    Ok(GrowthReport {
        previous_stage,
        stage: plant.stage,
        growth_gained: gained,
        health_delta: plant.health - before,
        factors,
        weather: weather_impact,
        disease,
        died,
    })
}

/// Stress from environmental extremes, offset by genetic tolerance
pub fn stress_level(env: &Environment, health: f64, genetics: &Genetics) -> f64 {
    let mut stressors = 0.0;
    if env.temperature < 65.0 || env.temperature > 85.0 {
        stressors += 1.0;
    }
    if env.humidity > 70.0 {
        stressors += 1.0;
    }
    if health < 70.0 {
        stressors += 1.0;
    }
    (stressors * 15.0 - genetics.stress_tolerance * 100.0).clamp(0.0, 100.0)
}

/// Disease risk in percent, offset by genetic resistance
pub fn disease_risk(env: &Environment, stress: f64, genetics: &Genetics) -> f64 {
    let mut risk = stress * 0.3;
    if env.humidity > 65.0 {
        risk += 20.0;
    }
    if env.temperature < 70.0 {
        risk += 15.0;
    }
    if env.air_circulation == AirCirculation::Poor {
        risk += 25.0;
    }
    (risk - genetics.disease_resistance * 100.0).clamp(0.0, 100.0)
}

/// Cannabinoid content now and at maturity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Potency {
    /// 0..1, fraction of the way to harvest
    pub development: f64,
    pub current_thc: f64,
    pub current_cbd: f64,
    pub projected_thc: f64,
    pub projected_cbd: f64,
}

pub fn potency(plant: &Plant, genetics: &Genetics) -> Potency {
    let development = (plant.growth_points / HARVEST_AT).min(1.0);
    let stress_factor = if plant.stress_level > 50.0 {
        0.9
    } else if plant.stress_level > 20.0 && plant.stress_level <= 40.0 {
        1.1
    } else {
        1.0
    };
    let projected_thc = genetics.thc.max * stress_factor;
    let projected_cbd = genetics.cbd.max * stress_factor;
    Potency {
        development,
        current_thc: projected_thc * development,
        current_cbd: projected_cbd * development,
        projected_thc,
        projected_cbd,
    }
}

/// Read-only look at a plant: what growing it right now would score and
/// what it is on course to yield. Nothing is advanced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub factors: GrowthFactors,
    pub potency: Potency,
    pub hours_to_harvest: f64,
    pub recommendations: Vec<String>,
}

pub fn inspect(plant: &Plant, genetics: &Genetics, weather: &[WeatherEffect]) -> Inspection {
    let env = plant.environment(genetics);
    let effective = if weather.is_empty() {
        env
    } else {
        env.under_weather(&WeatherImpact::fold(weather))
    };
    let factors = GrowthFactors::compute(&effective, plant.stage, genetics);
    Inspection {
        recommendations: recommendations(plant, &factors),
        potency: potency(plant, genetics),
        hours_to_harvest: plant.hours_to_harvest(),
        factors,
    }
}

/// Grower tips for the weakest factors
pub fn recommendations(plant: &Plant, factors: &GrowthFactors) -> Vec<String> {
    let mut tips = Vec::new();
    if factors.temperature < FITNESS_THRESHOLD {
        tips.push(format!(
            "Bring temperature closer to {:.0}°F",
            factors.target_temperature
        ));
    }
    if factors.humidity < FITNESS_THRESHOLD {
        tips.push(format!(
            "Bring humidity closer to {:.0}%",
            factors.target_humidity
        ));
    }
    if factors.light < FITNESS_THRESHOLD {
        tips.push(format!(
            "Use a {} hour light schedule during the {} stage",
            plant.stage.optimal_light_hours(),
            plant.stage
        ));
    }
    if factors.nutrients < FITNESS_THRESHOLD {
        tips.push("Adjust feeding toward balanced nutrients".to_string());
    }
    if plant.health < 50.0 {
        tips.push("Health is low: water the plant and check for disease".to_string());
    }
    if plant.stress_level > 50.0 {
        tips.push("Stress is high and will reduce potency".to_string());
    }
    if plant.stage == GrowthStage::Harvest && plant.is_growing() {
        tips.push("Ready to harvest".to_string());
    }
    tips
}
