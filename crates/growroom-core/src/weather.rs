//! Weather effects engine
//!
//! Effects are time-bounded environmental states. Several can be active at
//! once; their growth and yield modifiers compose multiplicatively and their
//! disease risk adds up, capped at 1.0.

use crate::error::{Error, Result};
use crate::identity::WeatherEffectId;
use crate::rng::GameRng;
use crate::time::{hours, Season};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health lost when weather triggers a disease
pub const DISEASE_HEALTH_PENALTY: f64 = 15.0;
/// Chance per cycle of adding a seasonal effect while others are active
pub const SEASONAL_CHANCE: f64 = 0.20;
/// Chance per cycle of an extreme event
pub const EXTREME_CHANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    HeatWave,
    ColdSnap,
    RainStorm,
    Drought,
    Sunny,
    Overcast,
    Windy,
}

impl WeatherKind {
    pub const ALL: [WeatherKind; 7] = [
        WeatherKind::HeatWave,
        WeatherKind::ColdSnap,
        WeatherKind::RainStorm,
        WeatherKind::Drought,
        WeatherKind::Sunny,
        WeatherKind::Overcast,
        WeatherKind::Windy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherKind::HeatWave => "heat_wave",
            WeatherKind::ColdSnap => "cold_snap",
            WeatherKind::RainStorm => "rain_storm",
            WeatherKind::Drought => "drought",
            WeatherKind::Sunny => "sunny",
            WeatherKind::Overcast => "overcast",
            WeatherKind::Windy => "windy",
        }
    }

    /// Unscaled modifiers for this kind of weather
    pub fn base_modifiers(&self) -> WeatherModifiers {
        let m = WeatherModifiers::default();
        match self {
            WeatherKind::HeatWave => WeatherModifiers {
                temperature: 15.0,
                humidity: -20.0,
                growth: -0.3,
                crop_yield: -0.15,
                disease_risk: 0.1,
                ..m
            },
            WeatherKind::ColdSnap => WeatherModifiers {
                temperature: -20.0,
                growth: -0.5,
                crop_yield: -0.2,
                disease_risk: 0.05,
                ..m
            },
            WeatherKind::RainStorm => WeatherModifiers {
                humidity: 30.0,
                light: -25.0,
                growth: 0.1,
                disease_risk: 0.15,
                ..m
            },
            WeatherKind::Drought => WeatherModifiers {
                humidity: -40.0,
                growth: -0.4,
                crop_yield: -0.25,
                disease_risk: 0.2,
                ..m
            },
            WeatherKind::Sunny => WeatherModifiers {
                light: 20.0,
                temperature: 5.0,
                growth: 0.15,
                crop_yield: 0.1,
                ..m
            },
            WeatherKind::Overcast => WeatherModifiers {
                light: -15.0,
                temperature: -3.0,
                growth: -0.1,
                ..m
            },
            WeatherKind::Windy => WeatherModifiers {
                humidity: -10.0,
                growth: -0.05,
                disease_risk: -0.05,
                ..m
            },
        }
    }
}

impl fmt::Display for WeatherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    pub fn multiplier(&self) -> f64 {
        match self {
            Severity::Mild => 0.5,
            Severity::Moderate => 1.0,
            Severity::Severe => 1.5,
            Severity::Extreme => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::Extreme => "extreme",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-factor modifiers of one effect
///
/// Temperature is in °F, humidity in percentage points, light in percent of
/// the light schedule. Growth and yield are fractional changes and disease
/// risk is a probability contribution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherModifiers {
    pub temperature: f64,
    pub humidity: f64,
    pub light: f64,
    pub growth: f64,
    #[serde(rename = "yield")]
    pub crop_yield: f64,
    pub disease_risk: f64,
}

impl WeatherModifiers {
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            temperature: self.temperature * factor,
            humidity: self.humidity * factor,
            light: self.light * factor,
            growth: self.growth * factor,
            crop_yield: self.crop_yield * factor,
            disease_risk: self.disease_risk * factor,
        }
    }
}

/// A stored, time-bounded weather effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherEffect {
    pub id: WeatherEffectId,
    pub kind: WeatherKind,
    pub severity: Severity,
    pub description: String,
    pub modifiers: WeatherModifiers,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_active: bool,
}

impl WeatherEffect {
    /// Build an effect from the modifier table, scaled by severity
    pub fn create(
        id: WeatherEffectId,
        kind: WeatherKind,
        severity: Severity,
        duration_hours: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !duration_hours.is_finite() || duration_hours <= 0.0 {
            return Err(Error::validation(format!(
                "weather duration must be positive, got {}",
                duration_hours
            )));
        }
        Ok(Self {
            id,
            kind,
            severity,
            description: format!("A {} {} weather event", severity, kind),
            modifiers: kind.base_modifiers().scaled(severity.multiplier()),
            start_time: now,
            end_time: now + hours(duration_hours),
            is_active: true,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.end_time > now
    }

    /// Administrative early end
    pub fn end_early(&mut self, now: DateTime<Utc>) {
        if self.end_time > now {
            self.end_time = now;
        }
        self.is_active = false;
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.end_time - now).max(Duration::zero())
    }
}

/// Effects active at `now`, newest first
pub fn active_effects(effects: &[WeatherEffect], now: DateTime<Utc>) -> Vec<WeatherEffect> {
    let mut active: Vec<WeatherEffect> = effects
        .iter()
        .filter(|e| e.is_active_at(now))
        .cloned()
        .collect();
    active.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
    active
}

/// Effects that will be in force at some point in the next `window_hours`
pub fn forecast(
    effects: &[WeatherEffect],
    now: DateTime<Utc>,
    window_hours: f64,
) -> Vec<WeatherEffect> {
    let horizon = now + hours(window_hours);
    let mut upcoming: Vec<WeatherEffect> = effects
        .iter()
        .filter(|e| e.is_active && e.end_time > now && e.start_time < horizon)
        .cloned()
        .collect();
    upcoming.sort_by_key(|e| (e.start_time, e.id));
    upcoming
}

/// Combined effect of all active weather
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherImpact {
    pub growth_multiplier: f64,
    pub yield_multiplier: f64,
    /// Probability in [0, 1]
    pub disease_risk: f64,
    pub temperature_shift: f64,
    pub humidity_shift: f64,
    /// Percent change of the light schedule
    pub light_shift: f64,
}

impl Default for WeatherImpact {
    fn default() -> Self {
        Self {
            growth_multiplier: 1.0,
            yield_multiplier: 1.0,
            disease_risk: 0.0,
            temperature_shift: 0.0,
            humidity_shift: 0.0,
            light_shift: 0.0,
        }
    }
}

impl WeatherImpact {
    pub fn fold(effects: &[WeatherEffect]) -> Self {
        let mut impact = effects.iter().fold(Self::default(), |acc, e| Self {
            growth_multiplier: acc.growth_multiplier * (1.0 + e.modifiers.growth),
            yield_multiplier: acc.yield_multiplier * (1.0 + e.modifiers.crop_yield),
            disease_risk: acc.disease_risk + e.modifiers.disease_risk,
            temperature_shift: acc.temperature_shift + e.modifiers.temperature,
            humidity_shift: acc.humidity_shift + e.modifiers.humidity,
            light_shift: acc.light_shift + e.modifiers.light,
        });
        impact.growth_multiplier = impact.growth_multiplier.max(0.0);
        impact.yield_multiplier = impact.yield_multiplier.max(0.0);
        impact.disease_risk = impact.disease_risk.clamp(0.0, 1.0);
        impact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiseaseKind {
    Mold,
    RootRot,
    HeatStress,
    NutrientDeficiency,
    ColdStress,
    GeneralStress,
    EnvironmentalStress,
}

/// Disease recorded against a plant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    pub kind: DiseaseKind,
    pub health_penalty: f64,
    pub contracted_at: DateTime<Utc>,
}

/// Disease caused by the newest active effect
pub fn disease_for(effects: &[WeatherEffect], rng: &mut GameRng) -> DiseaseKind {
    match effects.first().map(|e| e.kind) {
        None => DiseaseKind::EnvironmentalStress,
        Some(WeatherKind::RainStorm) => {
            if rng.coin_flip() {
                DiseaseKind::Mold
            } else {
                DiseaseKind::RootRot
            }
        }
        Some(WeatherKind::HeatWave) => DiseaseKind::HeatStress,
        Some(WeatherKind::Drought) => DiseaseKind::NutrientDeficiency,
        Some(WeatherKind::ColdSnap) => DiseaseKind::ColdStress,
        Some(_) => DiseaseKind::GeneralStress,
    }
}

/// Outcome of applying weather to a growth step
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthAdjustment {
    pub adjusted_rate: f64,
    pub impact: WeatherImpact,
    /// Set when the disease check fired
    pub disease: Option<DiseaseKind>,
}

impl GrowthAdjustment {
    pub fn health_penalty(&self) -> f64 {
        if self.disease.is_some() {
            DISEASE_HEALTH_PENALTY
        } else {
            0.0
        }
    }
}

/// Fold active effects over a base growth rate and run the disease check
pub fn apply_to_growth(
    effects: &[WeatherEffect],
    base_rate: f64,
    rng: &mut GameRng,
) -> GrowthAdjustment {
    apply_to_growth_with_risk(effects, base_rate, 0.0, rng)
}

/// Like [`apply_to_growth`], with extra disease risk contributed by the plant
pub fn apply_to_growth_with_risk(
    effects: &[WeatherEffect],
    base_rate: f64,
    baseline_risk: f64,
    rng: &mut GameRng,
) -> GrowthAdjustment {
    let mut impact = WeatherImpact::fold(effects);
    impact.disease_risk = (impact.disease_risk + baseline_risk).clamp(0.0, 1.0);

    let disease = if rng.next_f64() < impact.disease_risk {
        Some(disease_for(effects, rng))
    } else {
        None
    };

    GrowthAdjustment {
        adjusted_rate: base_rate * impact.growth_multiplier,
        impact,
        disease,
    }
}

/// What the scheduler should create
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherPlan {
    pub kind: WeatherKind,
    pub severity: Severity,
    pub duration_hours: f64,
}

impl WeatherPlan {
    pub fn into_effect(self, id: WeatherEffectId, now: DateTime<Utc>) -> Result<WeatherEffect> {
        WeatherEffect::create(id, self.kind, self.severity, self.duration_hours, now)
    }
}

pub fn seasonal_candidates(season: Season) -> [WeatherKind; 3] {
    match season {
        Season::Winter => [WeatherKind::ColdSnap, WeatherKind::Overcast, WeatherKind::Windy],
        Season::Spring => [WeatherKind::RainStorm, WeatherKind::Sunny, WeatherKind::Overcast],
        Season::Summer => [WeatherKind::HeatWave, WeatherKind::Sunny, WeatherKind::RainStorm],
        Season::Fall => [WeatherKind::Overcast, WeatherKind::Windy, WeatherKind::ColdSnap],
    }
}

/// Season-appropriate effect: 70% mild, 30% moderate, 4-16 hours
pub fn generate_seasonal(now: DateTime<Utc>, rng: &mut GameRng) -> WeatherPlan {
    let candidates = seasonal_candidates(Season::at(now));
    let kind = rng.pick(&candidates).copied().unwrap_or(WeatherKind::Sunny);
    let severity = match rng.weighted_index(&[0.7, 0.3]) {
        Some(1) => Severity::Moderate,
        _ => Severity::Mild,
    };
    WeatherPlan {
        kind,
        severity,
        duration_hours: rng.uniform(4.0, 16.0),
    }
}

/// Severe heat wave, cold snap or drought lasting 1-6 hours
pub fn generate_extreme(rng: &mut GameRng) -> WeatherPlan {
    let kind = rng
        .pick(&[WeatherKind::HeatWave, WeatherKind::ColdSnap, WeatherKind::Drought])
        .copied()
        .unwrap_or(WeatherKind::HeatWave);
    WeatherPlan {
        kind,
        severity: Severity::Severe,
        duration_hours: rng.range_i64(1, 6) as f64,
    }
}

/// Any kind, mild to severe, 2-24 hours
pub fn generate_random(rng: &mut GameRng) -> WeatherPlan {
    let kind = rng
        .pick(&WeatherKind::ALL)
        .copied()
        .unwrap_or(WeatherKind::Sunny);
    let severity = rng
        .pick(&[Severity::Mild, Severity::Moderate, Severity::Severe])
        .copied()
        .unwrap_or(Severity::Mild);
    WeatherPlan {
        kind,
        severity,
        duration_hours: rng.range_i64(2, 24) as f64,
    }
}

/// Decide which effects to start on one scheduler cycle
///
/// With nothing active a seasonal effect is always created.
pub fn plan_cycle(active_count: usize, now: DateTime<Utc>, rng: &mut GameRng) -> Vec<WeatherPlan> {
    let mut plans = Vec::new();
    if active_count == 0 || rng.chance(SEASONAL_CHANCE) {
        plans.push(generate_seasonal(now, rng));
    }
    if rng.chance(EXTREME_CHANCE) {
        plans.push(generate_extreme(rng));
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 10, 8, 0, 0).unwrap()
    }

    fn effect(id: u64, kind: WeatherKind, severity: Severity, h: f64) -> WeatherEffect {
        WeatherEffect::create(WeatherEffectId(id), kind, severity, h, t0()).unwrap()
    }

    #[test]
    fn test_heat_wave_severe_scenario() {
        let heat = effect(1, WeatherKind::HeatWave, Severity::Severe, 6.0);
        assert!((heat.modifiers.growth + 0.45).abs() < 1e-12);

        let mut rng = GameRng::new(1);
        let adj = apply_to_growth(&[heat], 4.0, &mut rng);
        assert!((adj.adjusted_rate - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_create_effect() {
        let e = effect(1, WeatherKind::RainStorm, Severity::Mild, 10.0);
        assert_eq!(e.description, "A mild rain_storm weather event");
        assert_eq!(e.end_time, t0() + Duration::hours(10));
        assert!((e.modifiers.humidity - 15.0).abs() < 1e-12);
        assert!(WeatherEffect::create(WeatherEffectId(2), WeatherKind::Sunny, Severity::Mild, 0.0, t0()).is_err());
    }

    #[test]
    fn test_active_effects_idempotent() {
        let mut ended = effect(3, WeatherKind::Windy, Severity::Mild, 5.0);
        ended.end_early(t0());
        let effects = vec![
            effect(1, WeatherKind::Sunny, Severity::Mild, 2.0),
            effect(2, WeatherKind::Drought, Severity::Moderate, 12.0),
            ended,
        ];
        let now = t0() + Duration::hours(3);
        let first = active_effects(&effects, now);
        let second = active_effects(&effects, now);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, WeatherKind::Drought);
        assert!(active_effects(&effects, t0() + Duration::hours(12)).is_empty());
    }

    #[test]
    fn test_fold_composition() {
        let effects = vec![
            effect(1, WeatherKind::Sunny, Severity::Moderate, 4.0),
            effect(2, WeatherKind::Drought, Severity::Extreme, 4.0),
            effect(3, WeatherKind::RainStorm, Severity::Extreme, 4.0),
            effect(4, WeatherKind::HeatWave, Severity::Extreme, 4.0),
        ];
        let impact = WeatherImpact::fold(&effects);
        let expected_growth = 1.15 * (1.0 - 0.8) * (1.0 + 0.2) * (1.0 - 0.6);
        assert!((impact.growth_multiplier - expected_growth).abs() < 1e-12);
        // 0.4 + 0.3 + 0.2
        assert!((impact.disease_risk - 0.9).abs() < 1e-12);

        let mut more = effects.clone();
        more.push(effect(5, WeatherKind::Drought, Severity::Moderate, 4.0));
        assert_eq!(WeatherImpact::fold(&more).disease_risk, 1.0);
        assert_eq!(WeatherImpact::fold(&[]), WeatherImpact::default());
    }

    #[test]
    fn test_disease_check_and_mapping() {
        let mut rng = GameRng::new(9);
        let drought = effect(1, WeatherKind::Drought, Severity::Moderate, 4.0);
        let adj = apply_to_growth_with_risk(&[drought], 4.0, 1.0, &mut rng);
        assert_eq!(adj.disease, Some(DiseaseKind::NutrientDeficiency));
        assert_eq!(adj.health_penalty(), DISEASE_HEALTH_PENALTY);

        let sunny = effect(2, WeatherKind::Sunny, Severity::Mild, 4.0);
        let adj = apply_to_growth(&[sunny], 4.0, &mut rng);
        assert_eq!(adj.disease, None);

        let storm = effect(3, WeatherKind::RainStorm, Severity::Mild, 4.0);
        for _ in 0..10 {
            let kind = disease_for(std::slice::from_ref(&storm), &mut rng);
            assert!(matches!(kind, DiseaseKind::Mold | DiseaseKind::RootRot));
        }
        assert_eq!(disease_for(&[], &mut rng), DiseaseKind::EnvironmentalStress);
    }

    #[test]
    fn test_generate_seasonal() {
        let mut rng = GameRng::new(21);
        let summer = seasonal_candidates(Season::Summer);
        let mut mild = 0;
        for _ in 0..1000 {
            let plan = generate_seasonal(t0(), &mut rng);
            assert!(summer.contains(&plan.kind));
            assert!((4.0..16.0).contains(&plan.duration_hours));
            assert!(matches!(plan.severity, Severity::Mild | Severity::Moderate));
            if plan.severity == Severity::Mild {
                mild += 1;
            }
        }
        assert!(mild > 620 && mild < 780, "{mild}");
    }

    #[test]
    fn test_plan_cycle_always_seeds_empty_sky() {
        let mut rng = GameRng::new(5);
        for _ in 0..50 {
            assert!(!plan_cycle(0, t0(), &mut rng).is_empty());
        }
        let extreme = generate_extreme(&mut rng);
        assert_eq!(extreme.severity, Severity::Severe);
        assert!((1.0..=6.0).contains(&extreme.duration_hours));
    }

    #[test]
    fn test_forecast_window() {
        let mut later = effect(2, WeatherKind::Windy, Severity::Mild, 4.0);
        later.start_time = t0() + Duration::hours(30);
        later.end_time = t0() + Duration::hours(34);
        let effects = vec![effect(1, WeatherKind::Sunny, Severity::Mild, 4.0), later];
        let upcoming = forecast(&effects, t0(), 24.0);
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, WeatherEffectId(1));
    }
}
