//! Domain events for the notification collaborator
//!
//! Events are published on a broadcast channel; a dispatcher outside this
//! crate subscribes and fans them out. Publishing with no subscriber is not
//! an error.

use chrono::{DateTime, Utc};
use growroom_core::{
    GeneticsId, MarketEventId, PlantId, PlayerId, Rarity, TradeId, WeatherEffectId,
};
use growroom_core::market::MarketEventKind;
use growroom_core::weather::WeatherKind;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TradeCompleted {
        trade: TradeId,
        initiator: PlayerId,
        target: PlayerId,
        at: DateTime<Utc>,
    },
    GeneticsBred {
        player: PlayerId,
        genetics: GeneticsId,
        rarity: Rarity,
        at: DateTime<Utc>,
    },
    PlantHarvested {
        player: PlayerId,
        plant: PlantId,
        weight: f64,
        at: DateTime<Utc>,
    },
    PlantDied {
        player: PlayerId,
        plant: PlantId,
        at: DateTime<Utc>,
    },
    MarketEventStarted {
        event: MarketEventId,
        kind: MarketEventKind,
        price_effect: f64,
        at: DateTime<Utc>,
    },
    WeatherChanged {
        effect: WeatherEffectId,
        kind: WeatherKind,
        at: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }
}

impl EventBus {
    pub fn publish(&self, event: DomainEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}
