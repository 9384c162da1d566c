//! Simulation context - the dependencies every component is built from
//!
//! There is no global engine state: the store, clock, random source and
//! configuration are passed in once at construction and shared through an
//! `Arc<SimContext>`.

use crate::config::CoordinatorConfig;
use crate::locks::EntityLocks;
use chrono::{DateTime, Utc};
use growroom_core::{Clock, GameRng};
use growroom_db::Store;
use std::sync::{Arc, Mutex};

pub struct SimContext {
    pub store: Arc<Store>,
    pub clock: Arc<dyn Clock>,
    pub config: CoordinatorConfig,
    pub locks: EntityLocks,
    rng: Mutex<GameRng>,
}

impl SimContext {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        rng: GameRng,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            locks: EntityLocks::default(),
            rng: Mutex::new(rng),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Split off an independent generator for one operation
    ///
    /// Forking keeps the shared lock short; the operation then draws from
    /// its own stream without contending with anything else.
    pub fn rng(&self) -> GameRng {
        self.rng.lock().unwrap_or_else(|e| e.into_inner()).fork()
    }
}
