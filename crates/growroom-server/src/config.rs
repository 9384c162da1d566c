//! RON configuration for the game server

use growroom_core::{GrowingLocation, LocationId};
use growroom_hub::{CoordinatorConfig, TokenEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Accepted logins
    #[serde(default)]
    pub auth: Vec<TokenEntry>,
    /// Growing locations seeded into the store at startup
    #[serde(default)]
    pub locations: Vec<LocationConfig>,
}

/// Listener, runtime and storage settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    /// Listen address (e.g., "0.0.0.0:7878")
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Runtime worker threads; defaults to one per CPU
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Fixed seed for the random source, mostly for replaying a session
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            worker_threads: None,
            database: DatabaseConfig::default(),
            seed: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:7878".to_string()
}

/// Where the store lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum DatabaseConfig {
    /// Lost on shutdown
    #[default]
    InMemory,
    /// Database file, created if missing
    Path(String),
}

/// A growing location block
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocationConfig {
    pub id: u64,
    pub name: String,
    #[serde(default = "default_market_modifier")]
    pub market_modifier: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_market_modifier() -> f64 {
    1.0
}

fn default_active() -> bool {
    true
}

impl LocationConfig {
    pub fn to_location(&self) -> GrowingLocation {
        GrowingLocation {
            id: LocationId(self.id),
            name: self.name.clone(),
            market_modifier: self.market_modifier,
            is_active: self.is_active,
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a RON string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig =
            ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        self.coordinator.validate().map_err(ConfigError::Validation)?;
        if self.server.worker_threads == Some(0) {
            return Err(ConfigError::Validation(
                "worker_threads must be at least 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for location in &self.locations {
            if !ids.insert(location.id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate location id {}",
                    location.id
                )));
            }
            if !(location.market_modifier.is_finite() && location.market_modifier > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "location {} market_modifier must be positive",
                    location.id
                )));
            }
        }

        let mut tokens = HashSet::new();
        for entry in &self.auth {
            if entry.token.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "empty token for {}",
                    entry.player
                )));
            }
            if !tokens.insert(entry.token.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "token for {} is not unique",
                    entry.player
                )));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind.parse().map_err(|_| {
            ConfigError::Validation(format!("invalid bind address {:?}", self.server.bind))
        })
    }

    /// Worker threads for the runtime, never more than the machine has
    pub fn worker_threads(&self) -> usize {
        let cpus = num_cpus::get();
        self.server.worker_threads.unwrap_or(cpus).clamp(1, cpus)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}
