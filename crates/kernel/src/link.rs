use glam::DVec3;
use std::sync::Arc;

use regionsync_common::{AvatarId, RegionId};

use crate::client::ClientHandle;
use crate::presence::EstablishmentTicket;
use crate::scene::SceneObject;

/// One-way message between region processes.
///
/// Every variant references entities by identity; receivers apply it to their
/// own local copies. Senders never wait for a reply.
#[derive(Debug, Clone)]
pub enum RegionMessage {
    /// Ask a neighbour to open a Child mirror. `position` is already in the
    /// neighbour's local frame.
    EstablishChild {
        avatar: AvatarId,
        name: String,
        root_region: RegionId,
        position: DVec3,
        ticket: EstablishmentTicket,
        client: Arc<dyn ClientHandle>,
    },
    /// Reply from the neighbour to the root region.
    EstablishResult {
        avatar: AvatarId,
        region: RegionId,
        ticket: EstablishmentTicket,
        accepted: bool,
    },
    /// Latest root position, translated into the receiver's frame.
    ChildPosition {
        avatar: AvatarId,
        position: DVec3,
        ticket: EstablishmentTicket,
    },
    /// The mirror opened under `ticket` is no longer wanted.
    CloseChild {
        avatar: AvatarId,
        ticket: EstablishmentTicket,
    },
    /// A scene object created by another actor, replicated to this one.
    ObjectCreated { object: SceneObject },
}

impl RegionMessage {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EstablishChild { .. } => "establish_child",
            Self::EstablishResult { .. } => "establish_result",
            Self::ChildPosition { .. } => "child_position",
            Self::CloseChild { .. } => "close_child",
            Self::ObjectCreated { .. } => "object_created",
        }
    }
}

/// Errors from the send-to-region primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("no route to region {0}")]
    UnknownRegion(RegionId),
    #[error("region {0} is no longer accepting messages")]
    Closed(RegionId),
}

/// "Send to region X". Implementations must not block on the receiver.
pub trait Transport: Send + Sync {
    fn send(&self, target: RegionId, message: RegionMessage) -> Result<(), TransportError>;
}
