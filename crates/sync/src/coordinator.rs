use std::fmt;

use regionsync_common::{ActorRole, ObjectId, RegionId};
use regionsync_kernel::SceneStore;

use crate::config::SyncConfig;

/// A region's entry in the cluster directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRegistration {
    pub region: RegionId,
    pub role: ActorRole,
    pub actor_id: String,
}

/// Why a region does not take part in synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InactiveReason {
    MissingSection,
    Disabled,
    UnrecognizedRole(String),
    /// The configured role belongs to a different actor module.
    RoleMismatch { configured: ActorRole },
    EmptyActorId,
}

impl fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSection => f.write_str("no sync configuration section"),
            Self::Disabled => f.write_str("sync is not enabled"),
            Self::UnrecognizedRole(s) => write!(f, "unrecognised actor type {s:?}"),
            Self::RoleMismatch { configured } => {
                write!(f, "configured as {configured}, not this actor")
            }
            Self::EmptyActorId => f.write_str("actor id not specified"),
        }
    }
}

/// Terminal outcome of configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    Active(ActorRegistration),
    Inactive(InactiveReason),
}

/// Result of [`ActorCoordinator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    /// The directory refused; the region carries on unsynchronized.
    Refused,
    /// Inactive regions never register.
    Skipped,
}

/// The cluster-wide actor directory.
pub trait ClusterDirectory {
    fn register_actor(&self, region: RegionId, role: ActorRole, actor_id: &str) -> bool;
}

/// Errors raised by creation hooks.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("object {0} is not in the scene")]
    MissingObject(ObjectId),
    #[error("role {0} may not change durability state")]
    AccessDenied(ActorRole),
    #[error("{hook} failed for object {object}: {source}")]
    Failed {
        hook: &'static str,
        object: ObjectId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Downstream handler for object creation, local or replicated.
pub trait CreationHook: Send {
    fn name(&self) -> &'static str;

    fn on_object_created(
        &mut self,
        scene: &mut SceneStore,
        role: ActorRole,
        id: ObjectId,
    ) -> Result<(), HookError>;
}

/// Per-region actor-role state machine and creation-hook table.
pub struct ActorCoordinator {
    module_role: ActorRole,
    state: CoordinatorState,
    registered: bool,
    hooks: Vec<Box<dyn CreationHook>>,
}

impl fmt::Debug for ActorCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorCoordinator")
            .field("module_role", &self.module_role)
            .field("state", &self.state)
            .field("registered", &self.registered)
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl ActorCoordinator {
    /// Decide, once, whether `region` takes part in synchronization as
    /// `module_role`.
    pub fn configure(region: RegionId, module_role: ActorRole, config: Option<&SyncConfig>) -> Self {
        let state = match evaluate(region, module_role, config) {
            Ok(registration) => {
                tracing::info!(%region, role = %registration.role, actor = %registration.actor_id, "sync actor configured");
                CoordinatorState::Active(registration)
            }
            Err(reason) => {
                tracing::warn!(%region, role = %module_role, %reason, "sync inactive");
                CoordinatorState::Inactive(reason)
            }
        };
        Self {
            module_role,
            state,
            registered: false,
            hooks: Vec::new(),
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, CoordinatorState::Active(_))
    }

    pub fn module_role(&self) -> ActorRole {
        self.module_role
    }

    pub fn registration(&self) -> Option<&ActorRegistration> {
        match &self.state {
            CoordinatorState::Active(r) => Some(r),
            CoordinatorState::Inactive(_) => None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Register with the cluster directory. A refusal is logged and
    /// reported; the region keeps running. Already-registered coordinators
    /// do not register again.
    pub fn start(&mut self, directory: &dyn ClusterDirectory) -> RegistrationOutcome {
        let CoordinatorState::Active(reg) = &self.state else {
            return RegistrationOutcome::Skipped;
        };
        if self.registered {
            return RegistrationOutcome::Registered;
        }
        if directory.register_actor(reg.region, reg.role, &reg.actor_id) {
            self.registered = true;
            tracing::info!(region = %reg.region, role = %reg.role, "actor registered");
            RegistrationOutcome::Registered
        } else {
            tracing::error!(region = %reg.region, role = %reg.role, "failure registering actor");
            RegistrationOutcome::Refused
        }
    }

    pub fn add_hook(&mut self, hook: Box<dyn CreationHook>) {
        self.hooks.push(hook);
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    /// An object was authored in this region.
    pub fn on_object_created(&mut self, scene: &mut SceneStore, id: ObjectId) -> Vec<HookError> {
        self.dispatch(scene, id)
    }

    /// An object arrived from another actor's sync stream.
    pub fn on_object_created_by_sync(
        &mut self,
        scene: &mut SceneStore,
        id: ObjectId,
    ) -> Vec<HookError> {
        self.dispatch(scene, id)
    }

    fn dispatch(&mut self, scene: &mut SceneStore, id: ObjectId) -> Vec<HookError> {
        if !self.is_active() {
            return Vec::new();
        }
        let mut errors = Vec::new();
        for hook in &mut self.hooks {
            if let Err(e) = hook.on_object_created(scene, self.module_role, id) {
                tracing::warn!(hook = hook.name(), object = %id, error = %e, "creation hook failed");
                errors.push(e);
            }
        }
        errors
    }
}

fn evaluate(
    region: RegionId,
    module_role: ActorRole,
    config: Option<&SyncConfig>,
) -> Result<ActorRegistration, InactiveReason> {
    let config = config.ok_or(InactiveReason::MissingSection)?;
    if !config.enabled {
        return Err(InactiveReason::Disabled);
    }
    let role: ActorRole = config
        .actor_type
        .parse()
        .map_err(|_| InactiveReason::UnrecognizedRole(config.actor_type.clone()))?;
    if role != module_role {
        return Err(InactiveReason::RoleMismatch { configured: role });
    }
    let actor_id = config.actor_id.trim();
    if actor_id.is_empty() {
        return Err(InactiveReason::EmptyActorId);
    }
    Ok(ActorRegistration {
        region,
        role,
        actor_id: actor_id.to_string(),
    })
}
