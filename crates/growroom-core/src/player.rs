//! Player progression and wallet

use crate::error::{Error, Result};
use crate::genetics::breeding_lab_level;
use crate::identity::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens granted to a brand new player
pub const STARTING_TOKENS: u64 = 500;
/// Base strains granted to a brand new player
pub const STARTER_STRAINS: usize = 2;
pub const EXPERIENCE_PER_LEVEL: u64 = 500;
pub const MAX_LEVEL: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub level: u32,
    pub experience: u64,
    pub tokens: u64,
    pub strains_bred: u32,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    /// Bumped on every stored write
    pub version: u64,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            level: 1,
            experience: 0,
            tokens: STARTING_TOKENS,
            strains_bred: 0,
            created_at: now,
            last_active: now,
            version: 0,
        }
    }

    /// Add experience and tokens; returns true on level up
    pub fn award(&mut self, experience: u64, tokens: u64) -> bool {
        let before = self.level;
        self.experience = self.experience.saturating_add(experience);
        self.tokens = self.tokens.saturating_add(tokens);
        self.level = level_for_experience(self.experience);
        self.level > before
    }

    pub fn spend(&mut self, tokens: u64) -> Result<()> {
        if self.tokens < tokens {
            return Err(Error::validation(format!(
                "{} has {} tokens, needs {}",
                self.id, self.tokens, tokens
            )));
        }
        self.tokens -= tokens;
        Ok(())
    }

    /// Breeding lab level, earned by strains bred. Reported to the player;
    /// breeding odds go by `level`.
    pub fn lab_level(&self) -> u32 {
        breeding_lab_level(self.strains_bred as usize)
    }
}

pub fn level_for_experience(experience: u64) -> u32 {
    let level = 1 + experience / EXPERIENCE_PER_LEVEL;
    level.min(MAX_LEVEL as u64) as u32
}
