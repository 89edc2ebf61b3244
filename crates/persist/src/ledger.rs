use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regionsync_common::ObjectId;
use regionsync_kernel::SceneObject;

/// Errors from the backup subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachError {
    #[error("object {id} is malformed: {reason}")]
    Malformed { id: ObjectId, reason: &'static str },
    #[error("object {0} is already attached")]
    AlreadyAttached(ObjectId),
    #[error("backup unavailable: {0}")]
    Unavailable(String),
}

/// The durability subsystem objects are attached to.
pub trait BackupSubsystem: Send {
    fn attach(&mut self, object: &SceneObject) -> Result<(), AttachError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    calls: usize,
    attached: BTreeSet<ObjectId>,
    offline: bool,
}

/// In-memory backup subsystem. Clones share one ledger.
#[derive(Debug, Clone, Default)]
pub struct BackupLedger {
    inner: Arc<Mutex<LedgerState>>,
}

impl BackupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attach call received, accepted or not.
    pub fn attach_calls(&self) -> usize {
        self.lock().calls
    }

    pub fn is_attached(&self, id: ObjectId) -> bool {
        self.lock().attached.contains(&id)
    }

    pub fn attached(&self) -> Vec<ObjectId> {
        self.lock().attached.iter().copied().collect()
    }

    /// Refuse every attach until switched back on.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackupSubsystem for BackupLedger {
    fn attach(&mut self, object: &SceneObject) -> Result<(), AttachError> {
        let mut state = self.lock();
        state.calls += 1;
        if state.offline {
            return Err(AttachError::Unavailable("ledger offline".into()));
        }
        if !object.position.is_finite() {
            return Err(AttachError::Malformed {
                id: object.id,
                reason: "non-finite position",
            });
        }
        if object.part_count == 0 {
            return Err(AttachError::Malformed {
                id: object.id,
                reason: "no parts",
            });
        }
        if !state.attached.insert(object.id) {
            return Err(AttachError::AlreadyAttached(object.id));
        }
        tracing::debug!(object = %object.id, name = %object.name, "attached to backup");
        Ok(())
    }
}
