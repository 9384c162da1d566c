//! Weather cycle and admin operations bound to the store

use crate::context::SimContext;
use crate::error::Result;
use crate::events::{DomainEvent, EventBus};
use chrono::{DateTime, Utc};
use growroom_core::weather::{active_effects, forecast, generate_random, plan_cycle, WeatherPlan};
use growroom_core::{Severity, WeatherEffect, WeatherEffectId, WeatherKind};
use growroom_db::sequence;
use growroom_net::WeatherSnapshot;
use std::sync::{Arc, RwLock};
use tracing::info;

pub const FORECAST_HOURS: f64 = 24.0;

pub struct WeatherEngine {
    ctx: Arc<SimContext>,
    events: EventBus,
    snapshot: RwLock<WeatherSnapshot>,
}

impl WeatherEngine {
    pub fn new(ctx: Arc<SimContext>, events: EventBus) -> Self {
        let snapshot = WeatherSnapshot {
            active: Vec::new(),
            forecast: Vec::new(),
            updated_at: ctx.now(),
        };
        Self {
            ctx,
            events,
            snapshot: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// One scheduler cycle: retire finished effects, maybe start new ones
    pub fn tick(&self) -> Result<WeatherSnapshot> {
        let now = self.ctx.now();
        let store = &self.ctx.store;
        store.expire_weather(now)?;
        let active = store.active_weather(now)?;
        for plan in plan_cycle(active.len(), now, &mut self.ctx.rng()) {
            self.start(plan, now)?;
        }
        let snapshot = self.refresh(now)?;
        info!(active = snapshot.active.len(), "weather tick");
        Ok(snapshot)
    }

    /// Admin: start a specific effect now
    pub fn create_effect(
        &self,
        kind: WeatherKind,
        severity: Severity,
        duration_hours: f64,
    ) -> Result<WeatherEffect> {
        let now = self.ctx.now();
        let effect = self.start(
            WeatherPlan {
                kind,
                severity,
                duration_hours,
            },
            now,
        )?;
        self.refresh(now)?;
        Ok(effect)
    }

    /// Admin: start a random effect of any kind
    pub fn random_event(&self) -> Result<WeatherEffect> {
        let plan = generate_random(&mut self.ctx.rng());
        let now = self.ctx.now();
        let effect = self.start(plan, now)?;
        self.refresh(now)?;
        Ok(effect)
    }

    /// Admin: end an effect ahead of schedule
    pub fn end_effect_early(&self, id: WeatherEffectId) -> Result<WeatherEffect> {
        let now = self.ctx.now();
        let effect = self.ctx.store.end_weather_effect(id, now)?;
        info!(effect = %id, kind = %effect.kind, "weather effect ended early");
        self.events.publish(DomainEvent::WeatherChanged {
            effect: id,
            kind: effect.kind,
            at: now,
        });
        self.refresh(now)?;
        Ok(effect)
    }

    fn start(&self, plan: WeatherPlan, now: DateTime<Utc>) -> Result<WeatherEffect> {
        let store = &self.ctx.store;
        let id = WeatherEffectId(store.next_id(sequence::WEATHER)?);
        let effect = plan.into_effect(id, now)?;
        store.save_weather_effect(&effect)?;
        info!(
            effect = %id,
            kind = %effect.kind,
            severity = %effect.severity,
            until = %effect.end_time,
            "weather effect started"
        );
        self.events.publish(DomainEvent::WeatherChanged {
            effect: id,
            kind: effect.kind,
            at: now,
        });
        Ok(effect)
    }

    fn refresh(&self, now: DateTime<Utc>) -> Result<WeatherSnapshot> {
        let all = self.ctx.store.weather_effects()?;
        let snapshot = WeatherSnapshot {
            active: active_effects(&all, now),
            forecast: forecast(&all, now, FORECAST_HOURS),
            updated_at: now,
        };
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
        Ok(snapshot)
    }
}
