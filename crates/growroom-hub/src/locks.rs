//! Per-entity async locks
//!
//! Mutations of one plant, one parent pair or one trade are serialised by
//! holding the entity's lock across the read-compute-write. Different
//! entities never contend.

use growroom_core::{GeneticsId, PlantId, PlayerId, TradeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Prune idle entries once the table grows past this
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Plant(PlantId),
    /// Unordered: (a, b) and (b, a) share a lock
    ParentPair(GeneticsId, GeneticsId),
    Trade(TradeId),
    Player(PlayerId),
}

impl LockKey {
    pub fn parent_pair(a: GeneticsId, b: GeneticsId) -> Self {
        if a <= b {
            LockKey::ParentPair(a, b)
        } else {
            LockKey::ParentPair(b, a)
        }
    }
}

#[derive(Default)]
pub struct EntityLocks {
    table: Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl EntityLocks {
    pub async fn lock(&self, key: LockKey) -> OwnedMutexGuard<()> {
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, m| Arc::strong_count(m) > 1);
            }
            table.entry(key).or_default().clone()
        };
        entry.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parent_pair_is_unordered() {
        assert_eq!(
            LockKey::parent_pair(GeneticsId(2), GeneticsId(1)),
            LockKey::parent_pair(GeneticsId(1), GeneticsId(2))
        );
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(EntityLocks::default());
        let guard = locks.lock(LockKey::Plant(PlantId(1))).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(LockKey::Plant(PlantId(1))).await;
            })
        };
        // Another key is free while plant 1 is held.
        let _other = locks.lock(LockKey::Plant(PlantId(2))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.len(), 2);
    }
}
