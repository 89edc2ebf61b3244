//! Actor-role coordination for multi-actor regions.
//!
//! A region participates in synchronization only when its configuration
//! enables it under a recognised role with an actor id. Otherwise it stays
//! inactive for its whole life and keeps working on its own.
//!
//! # Invariants
//! - Only an active coordinator registers with the cluster directory.
//! - Local and replicated object creations reach the same hooks, in
//!   registration order.

mod config;
mod coordinator;

pub use config::SyncConfig;
pub use coordinator::{
    ActorCoordinator, ActorRegistration, ClusterDirectory, CoordinatorState, CreationHook,
    HookError, InactiveReason, RegistrationOutcome,
};
