//! Region kernel: the authoritative per-region state.
//!
//! # Invariants
//! - Each region exclusively owns its presence registry and scene-object store.
//! - At most one Root presence exists per avatar across every registry that
//!   shares a [`RootClaims`] ledger.
//! - Cross-region state moves only as [`RegionMessage`]s that reference identity.

mod claims;
mod client;
mod link;
mod presence;
mod scene;

pub use claims::RootClaims;
pub use client::{ChatDelivery, ChatType, ClientHandle, DeliveryError, NullClient, SourceKind, Viewer};
pub use link::{RegionMessage, Transport, TransportError};
pub use presence::{
    ChildUpsert, EstablishmentTicket, Presence, PresenceError, PresenceKind, PresenceRegistry,
    RootUpsert,
};
pub use scene::{
    CreationOrigin, MAX_OBJECT_HEIGHT, ObjectFilter, PersistenceAccess, SceneError, SceneEvent,
    SceneObject, SceneStore,
};
