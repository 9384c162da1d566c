//! Growroom game server
//!
//! Loads a RON config, opens the store, builds the [`Coordinator`] and
//! serves newline-delimited JSON sessions over TCP. The hourly market and
//! weather ticks, the heartbeat sweep and trade expiry run as background
//! tasks next to the accept loop.

pub mod config;
mod error;
pub mod listener;

pub use config::{ConfigError, DatabaseConfig, ListenConfig, LocationConfig, ServerConfig};
pub use error::{Error, Result};
pub use listener::serve;

use chrono::Utc;
use growroom_core::{GameRng, SystemClock};
use growroom_db::Store;
use growroom_hub::{Coordinator, SimContext, StaticTokens};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Open the configured store, seed locations and wire up the coordinator
pub fn build_coordinator(config: &ServerConfig) -> Result<Arc<Coordinator>> {
    let store = match &config.server.database {
        DatabaseConfig::InMemory => Store::in_memory()?,
        DatabaseConfig::Path(path) => Store::open(path)?,
    };
    for location in &config.locations {
        store.save_location(&location.to_location())?;
    }

    let seed = config
        .server
        .seed
        .unwrap_or_else(|| Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64);
    let ctx = Arc::new(SimContext::new(
        Arc::new(store),
        Arc::new(SystemClock),
        GameRng::new(seed),
        config.coordinator.clone(),
    ));
    let auth = Arc::new(StaticTokens::new(config.auth.iter().cloned()));
    Ok(Arc::new(Coordinator::new(ctx, auth)))
}

/// Run the server until the listener fails or ctrl-c
pub async fn run(config: ServerConfig) -> Result<()> {
    let hub = build_coordinator(&config)?;
    info!(
        locations = config.locations.len(),
        logins = config.auth.len(),
        "coordinator ready"
    );

    // Clients connecting before the first scheduled tick still get a snapshot
    if let Err(e) = hub.weather_tick().await {
        error!(error = %e, "initial weather tick failed");
    }
    if let Err(e) = hub.market_tick().await {
        error!(error = %e, "initial market tick failed");
    }
    let background = hub.spawn_background();

    let listener = TcpListener::bind(config.bind_addr()?).await?;
    let result = tokio::select! {
        served = serve(listener, hub.clone()) => served.map_err(Error::from),
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    };

    for task in background {
        task.abort();
    }
    result
}
