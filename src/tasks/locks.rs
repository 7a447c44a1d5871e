//! Per-actor mutual exclusion for task writes.
//!
//! Deliveries for the same actor (and the sweep's writes to that actor's
//! task) run one at a time; different actors never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::actors::ActorRole;

const PRUNE_ABOVE: usize = 1024;

/// Table of per-`(actor_key, role)` async mutexes.
#[derive(Default)]
pub struct ActorLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ActorLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the lock for one actor. Held until the guard is dropped.
    pub async fn lock(&self, actor_key: &str, role: ActorRole) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on.
            if locks.len() > PRUNE_ABOVE {
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks
                .entry(format!("{role}:{actor_key}"))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_actor_is_serialized() {
        let locks = ActorLocks::new();
        let guard = locks.lock("2782", ActorRole::Initiator).await;

        let locks2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock("2782", ActorRole::Initiator).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "second lock must wait");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_actors_do_not_block() {
        let locks = ActorLocks::new();
        let _a = locks.lock("2782", ActorRole::Initiator).await;
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            locks.lock("2783", ActorRole::Initiator),
        )
        .await;
        assert!(b.is_ok());
        // Same key, different role, is a different actor.
        let c = tokio::time::timeout(
            Duration::from_millis(200),
            locks.lock("2782", ActorRole::Target),
        )
        .await;
        assert!(c.is_ok());
        assert_eq!(locks.locks.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = ActorLocks::new();
        let held = locks.lock("held", ActorRole::Initiator).await;
        for i in 0..=PRUNE_ABOVE {
            drop(locks.lock(&format!("{i}"), ActorRole::Target).await);
        }
        let _next = locks.lock("next", ActorRole::Target).await;

        let table = locks.locks.lock().await;
        assert!(table.len() < PRUNE_ABOVE);
        assert!(table.contains_key("initiator:held"));
        drop(held);
    }
}
