//! Open trade offers
//!
//! Pending offers live in memory only. An offer leaves the book when it is
//! accepted and settled, declined, cancelled or expired; only settled trades
//! reach the store.

use chrono::{DateTime, Utc};
use growroom_core::{Error, Result, TradeId, TradeOffer};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct TradeBook {
    offers: Mutex<HashMap<TradeId, TradeOffer>>,
}

impl TradeBook {
    fn offers(&self) -> std::sync::MutexGuard<'_, HashMap<TradeId, TradeOffer>> {
        self.offers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(&self, offer: TradeOffer) {
        self.offers().insert(offer.id, offer);
    }

    pub fn get(&self, id: TradeId) -> Result<TradeOffer> {
        self.offers()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Take an offer out of the book, e.g. once it is resolved
    pub fn close(&self, id: TradeId) -> Option<TradeOffer> {
        self.offers().remove(&id)
    }

    /// Pending offers at or past their deadline. Nothing is removed: the
    /// caller expires each one under its trade lock.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TradeId> {
        let mut due: Vec<TradeId> = self
            .offers()
            .values()
            .filter(|o| o.is_pending() && now >= o.expires_at)
            .map(|o| o.id)
            .collect();
        due.sort();
        due
    }

    pub fn len(&self) -> usize {
        self.offers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use growroom_core::{PlayerId, TradeItem, TradeItems, TradeStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn offer(id: u64) -> TradeOffer {
        TradeOffer::new(
            TradeId(id),
            PlayerId(1),
            PlayerId(2),
            TradeItems {
                offered: vec![TradeItem::Tokens(10)],
                requested: vec![],
            },
            Duration::minutes(15),
            now(),
        )
        .unwrap()
    }

    #[test]
    fn test_due_lists_without_removing() {
        let book = TradeBook::default();
        book.open(offer(1));
        let mut later = offer(2);
        later.expires_at = now() + Duration::minutes(30);
        book.open(later);

        assert!(book.due(now() + Duration::minutes(14)).is_empty());
        assert_eq!(book.due(now() + Duration::minutes(15)), vec![TradeId(1)]);
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(TradeId(1)).unwrap().status, TradeStatus::Pending);
        assert_eq!(
            book.due(now() + Duration::hours(1)),
            vec![TradeId(1), TradeId(2)]
        );
    }

    #[test]
    fn test_close() {
        let book = TradeBook::default();
        book.open(offer(1));
        assert_eq!(book.get(TradeId(1)).unwrap().target, PlayerId(2));
        assert!(book.close(TradeId(1)).is_some());
        assert!(book.close(TradeId(1)).is_none());
        assert!(book.is_empty());
    }
}
