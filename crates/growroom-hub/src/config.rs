//! Coordinator configuration - room limits, timeouts and tick cadence
//!
//! Every field has a default so a config file only needs to name what it
//! changes.

use growroom_core::trade::DEFAULT_TRADE_TTL_SECS;
use growroom_core::RoomId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the multiplayer coordinator
///
/// # Example
///
/// ```
/// use growroom_hub::CoordinatorConfig;
///
/// let config = CoordinatorConfig::default();
/// assert_eq!(config.room_capacity, 8);
/// assert_eq!(config.trade_ttl().num_minutes(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum members per room
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
    /// Seconds a trade offer stays open
    #[serde(default = "default_trade_ttl_secs")]
    pub trade_ttl_secs: i64,
    /// Seconds between pings
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence after which a connection is dropped
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    #[serde(default = "default_tick_secs")]
    pub market_tick_secs: u64,
    #[serde(default = "default_tick_secs")]
    pub weather_tick_secs: u64,
    /// Seconds between sweeps for offers past their TTL
    #[serde(default = "default_trade_sweep_secs")]
    pub trade_sweep_secs: u64,
    /// Attempts per tick when the store is unavailable
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Base delay between attempts; grows linearly
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Room a client lands in when it joins without naming one
    #[serde(default = "default_room")]
    pub default_room: RoomId,
}

fn default_room_capacity() -> usize {
    8
}

fn default_trade_ttl_secs() -> i64 {
    DEFAULT_TRADE_TTL_SECS
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_heartbeat_timeout_secs() -> u64 {
    90
}

fn default_tick_secs() -> u64 {
    3600
}

fn default_trade_sweep_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_room() -> RoomId {
    RoomId::new("global")
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            room_capacity: default_room_capacity(),
            trade_ttl_secs: default_trade_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            market_tick_secs: default_tick_secs(),
            weather_tick_secs: default_tick_secs(),
            trade_sweep_secs: default_trade_sweep_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_room: default_room(),
        }
    }
}

impl CoordinatorConfig {
    pub fn trade_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.trade_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn market_tick(&self) -> Duration {
        Duration::from_secs(self.market_tick_secs)
    }

    pub fn weather_tick(&self) -> Duration {
        Duration::from_secs(self.weather_tick_secs)
    }

    pub fn trade_sweep(&self) -> Duration {
        Duration::from_secs(self.trade_sweep_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Check the values make sense together
    pub fn validate(&self) -> Result<(), String> {
        if self.room_capacity == 0 {
            return Err("room_capacity must be at least 1".into());
        }
        if self.trade_ttl_secs <= 0 {
            return Err("trade_ttl_secs must be positive".into());
        }
        if self.heartbeat_interval_secs == 0
            || self.market_tick_secs == 0
            || self.weather_tick_secs == 0
            || self.trade_sweep_secs == 0
        {
            return Err("intervals must be positive".into());
        }
        if self.trade_sweep_secs as i64 > self.trade_ttl_secs {
            return Err(format!(
                "trade_sweep_secs ({}) must not exceed trade_ttl_secs ({})",
                self.trade_sweep_secs, self.trade_ttl_secs
            ));
        }
        if self.heartbeat_timeout_secs <= self.heartbeat_interval_secs {
            return Err(format!(
                "heartbeat_timeout_secs ({}) must exceed heartbeat_interval_secs ({})",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            ));
        }
        Ok(())
    }
}

/// Retry with linear backoff: attempt `n` waits `backoff * n` before running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}
