use std::sync::{Mutex, MutexGuard, PoisonError};

use regionsync_common::{ActorRole, RegionId};
use regionsync_sync::{ActorRegistration, ClusterDirectory};

/// In-memory cluster directory. A region registers each role once.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    actors: Mutex<Vec<ActorRegistration>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registrations(&self) -> Vec<ActorRegistration> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ActorRegistration>> {
        self.actors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClusterDirectory for MemoryDirectory {
    fn register_actor(&self, region: RegionId, role: ActorRole, actor_id: &str) -> bool {
        let mut actors = self.lock();
        if actors.iter().any(|a| a.region == region && a.role == role) {
            tracing::warn!(%region, %role, "actor already registered");
            return false;
        }
        actors.push(ActorRegistration {
            region,
            role,
            actor_id: actor_id.to_string(),
        });
        true
    }
}
