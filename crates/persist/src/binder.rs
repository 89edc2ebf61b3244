use regionsync_common::{ActorRole, ObjectId};
use regionsync_kernel::SceneStore;
use regionsync_sync::{CreationHook, HookError};

use crate::ledger::{AttachError, BackupSubsystem};

/// What a creation notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// First notification: flagged and attached.
    Attached,
    /// Already flagged by an earlier notification; nothing done.
    AlreadyFlagged,
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("role {0} may not change durability state")]
    AccessDenied(ActorRole),
    #[error("object {0} is not in the scene")]
    MissingObject(ObjectId),
    #[error(transparent)]
    Attach(#[from] AttachError),
}

/// Binds newly created scene objects to the backup subsystem.
#[derive(Debug)]
pub struct PersistenceBinder<B> {
    backup: B,
}

impl<B: BackupSubsystem> PersistenceBinder<B> {
    pub fn new(backup: B) -> Self {
        Self { backup }
    }

    pub fn backup(&self) -> &B {
        &self.backup
    }

    /// Flag `id` persist-pending and attach it, unless already flagged.
    ///
    /// When the backup subsystem refuses, the flag stays set and the object
    /// stays unattached. Nothing is retried here.
    pub fn bind(
        &mut self,
        scene: &mut SceneStore,
        role: ActorRole,
        id: ObjectId,
    ) -> Result<BindOutcome, BindError> {
        let mut access = scene.persistence(role).ok_or(BindError::AccessDenied(role))?;
        match access.mark_persist_pending(id) {
            None => Err(BindError::MissingObject(id)),
            Some(false) => Ok(BindOutcome::AlreadyFlagged),
            Some(true) => {
                let object = access.get(id).ok_or(BindError::MissingObject(id))?;
                self.backup.attach(object)?;
                access.mark_backed_up(id);
                Ok(BindOutcome::Attached)
            }
        }
    }

    /// Attach every object that is flagged but not backed up, typically after
    /// the backup subsystem comes back. Returns the objects still refused.
    pub fn reattach_pending(
        &mut self,
        scene: &mut SceneStore,
        role: ActorRole,
    ) -> Result<Vec<(ObjectId, AttachError)>, BindError> {
        let stranded: Vec<ObjectId> = scene
            .iter()
            .filter(|o| o.persist_pending() && !o.backed_up())
            .map(|o| o.id)
            .collect();
        let mut access = scene.persistence(role).ok_or(BindError::AccessDenied(role))?;
        let mut refused = Vec::new();
        for id in stranded {
            let Some(object) = access.get(id) else {
                continue;
            };
            match self.backup.attach(object) {
                Ok(()) => {
                    access.mark_backed_up(id);
                }
                Err(e) => refused.push((id, e)),
            }
        }
        Ok(refused)
    }
}

impl<B: BackupSubsystem> CreationHook for PersistenceBinder<B> {
    fn name(&self) -> &'static str {
        "persistence_binder"
    }

    fn on_object_created(
        &mut self,
        scene: &mut SceneStore,
        role: ActorRole,
        id: ObjectId,
    ) -> Result<(), HookError> {
        match self.bind(scene, role, id) {
            Ok(outcome) => {
                tracing::trace!(object = %id, ?outcome, "persistence bind");
                Ok(())
            }
            Err(BindError::AccessDenied(role)) => Err(HookError::AccessDenied(role)),
            Err(BindError::MissingObject(id)) => Err(HookError::MissingObject(id)),
            Err(BindError::Attach(e)) => Err(HookError::Failed {
                hook: self.name(),
                object: id,
                source: Box::new(e),
            }),
        }
    }
}
