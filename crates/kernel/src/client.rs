use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use regionsync_common::{AvatarId, RegionId};

/// Audible tier of a chat-like event, ordered by reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Whisper,
    Say,
    Shout,
    /// Every presence in the source region, regardless of distance.
    Region,
}

/// What emitted a chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Avatar,
    Object,
}

/// One chat event as handed to a single recipient's client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDelivery {
    pub recipient: AvatarId,
    pub text: String,
    pub chat_type: ChatType,
    pub channel: i32,
    /// Source position in the world-global frame.
    pub source_pos: DVec3,
    pub source_name: String,
    pub source_id: uuid::Uuid,
    pub owner_id: uuid::Uuid,
    pub source_kind: SourceKind,
    pub audible: bool,
}

/// Per-recipient send failure. Never aborts a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("client for {0} is disconnected")]
    Disconnected(AvatarId),
    #[error("client send failed: {0}")]
    Send(String),
}

/// Opaque handle to the viewer connection behind a presence.
///
/// For a Child presence this forwards to the remote viewer, which is how chat
/// heard in one region reaches a listener connected to its neighbour.
pub trait ClientHandle: Send + Sync + fmt::Debug {
    fn deliver_chat(&self, delivery: &ChatDelivery) -> Result<(), DeliveryError>;
}

/// A connected viewer. It opens one circuit per region it can see: the root
/// region and every neighbour mirroring it.
pub trait Viewer: Send + Sync + fmt::Debug {
    fn circuit(&self, region: RegionId) -> Arc<dyn ClientHandle>;
}

/// Client handle that accepts and drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullClient;

impl ClientHandle for NullClient {
    fn deliver_chat(&self, _delivery: &ChatDelivery) -> Result<(), DeliveryError> {
        Ok(())
    }
}

impl Viewer for NullClient {
    fn circuit(&self, _region: RegionId) -> Arc<dyn ClientHandle> {
        Arc::new(NullClient)
    }
}
