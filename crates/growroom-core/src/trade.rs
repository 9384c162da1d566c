//! Two-party trade offers
//!
//! An offer goes to exactly one target. It is `Pending` until the target
//! accepts or declines, the initiator cancels, or the TTL runs out. Once it
//! leaves `Pending` it never changes again.

use crate::error::{Error, Result};
use crate::identity::{GeneticsId, PlantId, PlayerId, TradeId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Offers expire after fifteen minutes unless configured otherwise
pub const DEFAULT_TRADE_TTL_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeItem {
    Genetics(GeneticsId),
    Plant(PlantId),
    Tokens(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TradeItems {
    /// What the initiator gives
    #[serde(default)]
    pub offered: Vec<TradeItem>,
    /// What the initiator wants from the target
    #[serde(default)]
    pub requested: Vec<TradeItem>,
}

impl TradeItems {
    pub fn validate(&self) -> Result<()> {
        if self.offered.is_empty() && self.requested.is_empty() {
            return Err(Error::validation("trade has no items"));
        }
        let mut seen = HashSet::new();
        for item in self.offered.iter().chain(self.requested.iter()) {
            match item {
                TradeItem::Tokens(0) => {
                    return Err(Error::validation("token amounts must be positive"))
                }
                TradeItem::Tokens(_) => {}
                other => {
                    if !seen.insert(*other) {
                        return Err(Error::validation(format!("duplicate trade item {:?}", other)));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn tokens_offered(&self) -> u64 {
        token_sum(&self.offered)
    }

    pub fn tokens_requested(&self) -> u64 {
        token_sum(&self.requested)
    }
}

fn token_sum(items: &[TradeItem]) -> u64 {
    items
        .iter()
        .map(|i| match i {
            TradeItem::Tokens(n) => *n,
            _ => 0,
        })
        .fold(0u64, u64::saturating_add)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
    Cancelled,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Accepted => "accepted",
            TradeStatus::Declined => "declined",
            TradeStatus::Expired => "expired",
            TradeStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub id: TradeId,
    pub initiator: PlayerId,
    pub target: PlayerId,
    pub items: TradeItems,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TradeOffer {
    pub fn new(
        id: TradeId,
        initiator: PlayerId,
        target: PlayerId,
        items: TradeItems,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if initiator == target {
            return Err(Error::validation("cannot trade with yourself"));
        }
        items.validate()?;
        Ok(Self {
            id,
            initiator,
            target,
            items,
            status: TradeStatus::Pending,
            created_at: now,
            expires_at: now + ttl,
            resolved_at: None,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == TradeStatus::Pending
    }

    /// Move a pending offer past its TTL to `Expired`; true if it changed
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_pending() && now >= self.expires_at {
            self.status = TradeStatus::Expired;
            self.resolved_at = Some(self.expires_at);
            true
        } else {
            false
        }
    }

    fn ensure_open(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expire_if_due(now);
        match self.status {
            TradeStatus::Pending => Ok(()),
            status => Err(Error::validation(format!("{} is already {}", self.id, status))),
        }
    }

    /// Check the target may accept; the caller settles and then calls [`Self::mark_accepted`]
    pub fn check_acceptable(&mut self, responder: PlayerId, now: DateTime<Utc>) -> Result<()> {
        if responder != self.target {
            return Err(Error::ownership("trade", self.id, responder));
        }
        self.ensure_open(now)
    }

    pub fn mark_accepted(&mut self, now: DateTime<Utc>) {
        self.status = TradeStatus::Accepted;
        self.resolved_at = Some(now);
    }

    pub fn decline(&mut self, responder: PlayerId, now: DateTime<Utc>) -> Result<()> {
        if responder != self.target {
            return Err(Error::ownership("trade", self.id, responder));
        }
        self.ensure_open(now)?;
        self.status = TradeStatus::Declined;
        self.resolved_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, by: PlayerId, now: DateTime<Utc>) -> Result<()> {
        if by != self.initiator {
            return Err(Error::ownership("trade", self.id, by));
        }
        self.ensure_open(now)?;
        self.status = TradeStatus::Cancelled;
        self.resolved_at = Some(now);
        Ok(())
    }
}
