//! Actor-keyed async mutual exclusion.
//!
//! The limit check, the reciprocation call and the ledger increment for one
//! actor run under that actor's lock, so concurrent events from the same actor
//! cannot both pass the limit check on the same count. Entries are dropped once
//! nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::identity::UserId;

#[derive(Debug, Default)]
pub struct ActorLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl ActorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<UserId, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn acquire(&self, user_id: UserId) -> ActorLockGuard<'_> {
        let slot = Arc::clone(self.table().entry(user_id).or_default());
        let guard = slot.lock_owned().await;
        ActorLockGuard {
            owner: self,
            user_id,
            guard: Some(guard),
        }
    }

    /// Number of actors currently holding or waiting on a lock.
    pub fn active_len(&self) -> usize {
        self.table().len()
    }
}

/// Held for the duration of one actor's critical section.
pub struct ActorLockGuard<'a> {
    owner: &'a ActorLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ActorLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.owner.table();
        let idle = table
            .get(&self.user_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1);
        if idle {
            table.remove(&self.user_id);
        }
    }
}
