use std::sync::{Arc, PoisonError, RwLock};

use crate::actor_locks::ActorLocks;
use crate::identity::UserId;
use crate::reciprocation_config::ReciprocationConfig;
use crate::vip_rate_ledger::VipRateLedger;

/// Long-lived state shared by every pipeline invocation.
///
/// Configuration is swapped whole and read as one snapshot per event. The
/// self identity starts unset until startup resolves it.
#[derive(Debug)]
pub struct ReciprocationState {
    config: RwLock<Arc<ReciprocationConfig>>,
    self_id: RwLock<Option<UserId>>,
    ledger: Arc<VipRateLedger>,
    actor_locks: ActorLocks,
}

impl ReciprocationState {
    pub fn new(config: ReciprocationConfig, ledger: Arc<VipRateLedger>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            self_id: RwLock::new(None),
            ledger,
            actor_locks: ActorLocks::new(),
        }
    }

    pub fn config(&self) -> Arc<ReciprocationConfig> {
        Arc::clone(&self.config.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace_config(&self, config: ReciprocationConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    pub fn self_id(&self) -> Option<UserId> {
        *self.self_id.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_self_id(&self, self_id: Option<UserId>) {
        *self.self_id.write().unwrap_or_else(PoisonError::into_inner) = self_id;
    }

    pub fn ledger(&self) -> &Arc<VipRateLedger> {
        &self.ledger
    }

    pub(crate) fn actor_locks(&self) -> &ActorLocks {
        &self.actor_locks
    }
}
