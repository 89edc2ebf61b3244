use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use glam::DVec3;

use regionsync_chat::{ChatMessage, ChatSource, DeliveryReport, ProximityDelivery};
use regionsync_common::{AvatarId, ObjectId, Region, RegionId, to_global};
use regionsync_kernel::{
    ObjectFilter, Presence, PresenceError, PresenceRegistry, RegionMessage, RootClaims,
    SceneError, SceneEvent, SceneObject, SceneStore, Transport, Viewer,
};
use regionsync_stream::{NeighborDiff, NeighborMap, NeighborNotifier};
use regionsync_sync::{
    ActorCoordinator, ClusterDirectory, CreationHook, HookError, RegistrationOutcome,
};

use crate::config::HostConfig;

/// Errors from region host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error(transparent)]
    Presence(#[from] PresenceError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("avatar {0} has no root presence here")]
    NotRooted(AvatarId),
    #[error("avatar {avatar} moved outside the region to {global}")]
    OutsideRegion { avatar: AvatarId, global: DVec3 },
    #[error("object {0} is not in the scene")]
    UnknownObject(ObjectId),
}

/// Result of a local object creation.
#[derive(Debug)]
pub struct CreationReport {
    pub id: ObjectId,
    /// Hook failures, such as a refused backup attach. The object exists.
    pub hook_errors: Vec<HookError>,
}

/// What one mailbox drain did.
#[derive(Debug, Default)]
pub struct InboxReport {
    pub handled: usize,
    /// Hook failures from creations that arrived over the sync stream.
    pub hook_errors: Vec<HookError>,
}

/// What one world-update tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub handled: usize,
    pub hook_errors: Vec<HookError>,
    /// Scene mutations since the previous tick, drained from the scene log.
    pub scene_events: Vec<SceneEvent>,
}

/// One region process: its registry, scene, notifier, chat fan-out, actor
/// coordinator and mailbox.
///
/// All state changes happen on the caller's thread; other regions are only
/// reached through the transport.
pub struct RegionHost {
    registry: PresenceRegistry,
    scene: SceneStore,
    notifier: NeighborNotifier,
    chat: ProximityDelivery,
    coordinator: ActorCoordinator,
    transport: Arc<dyn Transport>,
    inbox: Receiver<RegionMessage>,
    viewers: BTreeMap<AvatarId, Arc<dyn Viewer>>,
    sync_peers: Vec<Arc<dyn Transport>>,
}

impl std::fmt::Debug for RegionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionHost")
            .field("region", &self.region().name())
            .field("presences", &self.registry.len())
            .field("objects", &self.scene.len())
            .field("coordinator", &self.coordinator)
            .field("sync_peers", &self.sync_peers.len())
            .finish()
    }
}

impl RegionHost {
    pub fn new(
        neighbours: NeighborMap,
        claims: RootClaims,
        transport: Arc<dyn Transport>,
        inbox: Receiver<RegionMessage>,
        config: &HostConfig,
    ) -> Self {
        let region = neighbours.home().clone();
        let coordinator = ActorCoordinator::configure(region.id(), config.role, config.sync.as_ref());
        Self {
            registry: PresenceRegistry::new(region.clone(), claims),
            scene: SceneStore::new(region),
            notifier: NeighborNotifier::new(neighbours, config.notifier.clone()),
            chat: ProximityDelivery::new(config.chat),
            coordinator,
            transport,
            inbox,
            viewers: BTreeMap::new(),
            sync_peers: Vec::new(),
        }
    }

    pub fn region(&self) -> &Region {
        self.registry.region()
    }

    pub fn id(&self) -> RegionId {
        self.registry.region().id()
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn scene(&self) -> &SceneStore {
        &self.scene
    }

    pub fn notifier(&self) -> &NeighborNotifier {
        &self.notifier
    }

    pub fn coordinator(&self) -> &ActorCoordinator {
        &self.coordinator
    }

    /// Replicate local creations to another actor of this region. `peer`
    /// routes this region's id to that actor's mailbox.
    pub fn add_sync_peer(&mut self, peer: Arc<dyn Transport>) {
        self.sync_peers.push(peer);
    }

    pub fn add_creation_hook(&mut self, hook: Box<dyn CreationHook>) {
        self.coordinator.add_hook(hook);
    }

    /// Register this region's actor with the cluster directory.
    pub fn start(&mut self, directory: &dyn ClusterDirectory) -> RegistrationOutcome {
        self.coordinator.start(directory)
    }

    /// Root `avatar` here and start mirroring it into nearby neighbours.
    pub fn login(
        &mut self,
        avatar: AvatarId,
        name: &str,
        position: DVec3,
        flying: bool,
        viewer: Arc<dyn Viewer>,
    ) -> Result<NeighborDiff, HostError> {
        if !self.region().contains_local(position) {
            return Err(HostError::OutsideRegion {
                avatar,
                global: to_global(position, self.region()),
            });
        }
        let client = viewer.circuit(self.id());
        let outcome = self
            .registry
            .upsert_root(avatar, name, position, flying, client)?;
        tracing::info!(%avatar, avatar_name = name, region = self.region().name(), ?outcome, "login");
        self.viewers.insert(avatar, viewer);
        Ok(self.refresh(avatar))
    }

    /// Move a locally rooted avatar. Positions outside the region are
    /// rejected; crossing is the caller's job.
    pub fn move_avatar(
        &mut self,
        avatar: AvatarId,
        position: DVec3,
        flying: bool,
    ) -> Result<NeighborDiff, HostError> {
        let presence = self
            .registry
            .get(avatar)
            .filter(|p| p.is_root())
            .ok_or(HostError::NotRooted(avatar))?;
        if !self.region().contains_local(position) {
            return Err(HostError::OutsideRegion {
                avatar,
                global: to_global(position, self.region()),
            });
        }
        let (name, client) = (presence.name.clone(), presence.client.clone());
        self.registry
            .upsert_root(avatar, &name, position, flying, client)?;
        Ok(self.refresh(avatar))
    }

    /// Remove the avatar's Root and every mirror it had.
    pub fn logout(&mut self, avatar: AvatarId) -> Result<Presence, HostError> {
        let (presence, _) = self.hand_off(avatar)?;
        tracing::info!(%avatar, region = self.region().name(), "logout");
        Ok(presence)
    }

    /// Release the avatar's Root so another region can claim it. Returns the
    /// removed presence and the avatar's viewer.
    pub fn hand_off(&mut self, avatar: AvatarId) -> Result<(Presence, Arc<dyn Viewer>), HostError> {
        if !self.registry.get(avatar).is_some_and(Presence::is_root) {
            return Err(HostError::NotRooted(avatar));
        }
        self.notifier
            .on_root_departed(&mut self.registry, avatar, self.transport.as_ref());
        let presence = self
            .registry
            .remove_root(avatar)
            .ok_or(HostError::NotRooted(avatar))?;
        let viewer = self
            .viewers
            .remove(&avatar)
            .unwrap_or_else(|| Arc::new(regionsync_kernel::NullClient));
        Ok((presence, viewer))
    }

    /// Chat from a locally rooted avatar. `neighbours` are the registries of
    /// the regions bordering this one; presences there hear the avatar too.
    pub fn chat_from_avatar(
        &self,
        avatar: AvatarId,
        message: &ChatMessage,
        neighbours: &[&PresenceRegistry],
    ) -> Result<DeliveryReport, HostError> {
        let presence = self
            .registry
            .get(avatar)
            .filter(|p| p.is_root())
            .ok_or(HostError::NotRooted(avatar))?;
        let source = ChatSource::avatar(presence, self.region());
        Ok(self.deliver(&source, message, neighbours))
    }

    /// Chat from a scene object in this region.
    pub fn chat_from_object(
        &self,
        id: ObjectId,
        message: &ChatMessage,
        neighbours: &[&PresenceRegistry],
    ) -> Result<DeliveryReport, HostError> {
        let object = self.scene.get(id).ok_or(HostError::UnknownObject(id))?;
        let source = ChatSource::object(object, self.region());
        Ok(self.deliver(&source, message, neighbours))
    }

    fn deliver(
        &self,
        source: &ChatSource,
        message: &ChatMessage,
        neighbours: &[&PresenceRegistry],
    ) -> DeliveryReport {
        let mut participants = Vec::with_capacity(neighbours.len() + 1);
        participants.push(&self.registry);
        participants.extend(neighbours.iter().copied().filter(|r| r.region().id() != self.id()));
        self.chat.deliver(source, message, &participants)
    }

    /// Author an object here, run the creation hooks and replicate it to the
    /// region's other actors.
    pub fn create_object(&mut self, object: SceneObject) -> Result<CreationReport, HostError> {
        let id = self.scene.create_local(object)?;
        let hook_errors = self.coordinator.on_object_created(&mut self.scene, id);
        if self.coordinator.is_active() {
            if let Some(object) = self.scene.get(id) {
                for peer in &self.sync_peers {
                    let message = RegionMessage::ObjectCreated {
                        object: object.clone(),
                    };
                    if let Err(e) = peer.send(self.id(), message) {
                        tracing::warn!(object = %id, error = %e, "creation not replicated");
                    }
                }
            }
        }
        Ok(CreationReport { id, hook_errors })
    }

    /// Delete the objects matching `filter`. Attachments are kept.
    pub fn delete_objects(&mut self, filter: &ObjectFilter) -> Vec<SceneObject> {
        let ids = self.scene.deletion_candidates(filter);
        self.scene.delete(&ids)
    }

    /// Apply every queued message.
    pub fn process_inbox(&mut self) -> InboxReport {
        let _span = tracing::info_span!("inbox", region = self.region().name()).entered();
        let mut report = InboxReport::default();
        while let Ok(message) = self.inbox.try_recv() {
            report.hook_errors.extend(self.handle(message));
            report.handled += 1;
        }
        report
    }

    /// One world-update tick: drain the mailbox, advance the scene and hand
    /// back the scene events recorded since the last tick.
    pub fn step(&mut self) -> TickReport {
        let inbox = self.process_inbox();
        self.scene.step();
        let scene_events = self.scene.drain_events();
        if !scene_events.is_empty() {
            tracing::trace!(
                region = self.region().name(),
                tick = self.scene.tick(),
                events = scene_events.len(),
                "scene events"
            );
        }
        TickReport {
            handled: inbox.handled,
            hook_errors: inbox.hook_errors,
            scene_events,
        }
    }

    fn refresh(&mut self, avatar: AvatarId) -> NeighborDiff {
        let Some(viewer) = self.viewers.get(&avatar).cloned() else {
            return NeighborDiff::default();
        };
        self.notifier.on_root_moved(
            &mut self.registry,
            avatar,
            viewer.as_ref(),
            self.transport.as_ref(),
        )
    }

    fn handle(&mut self, message: RegionMessage) -> Vec<HookError> {
        tracing::debug!(kind = message.kind(), "message");
        match message {
            RegionMessage::EstablishChild {
                avatar,
                name,
                root_region,
                position,
                ticket,
                client,
            } => {
                let outcome = self
                    .registry
                    .upsert_child(avatar, &name, root_region, position, ticket, client);
                let reply = RegionMessage::EstablishResult {
                    avatar,
                    region: self.id(),
                    ticket,
                    accepted: outcome.applied(),
                };
                if let Err(e) = self.transport.send(root_region, reply) {
                    tracing::warn!(%avatar, %root_region, error = %e, "establishment reply lost");
                }
            }
            RegionMessage::EstablishResult {
                avatar,
                region,
                ticket,
                accepted,
            } => {
                let established = self.notifier.on_establish_result(
                    &mut self.registry,
                    avatar,
                    region,
                    ticket,
                    accepted,
                );
                // The root may have moved while the request was in flight.
                if established == Ok(true) {
                    self.refresh(avatar);
                }
            }
            RegionMessage::ChildPosition {
                avatar,
                position,
                ticket,
            } => {
                let outcome = self.registry.update_child(avatar, position, ticket);
                if !outcome.applied() {
                    tracing::debug!(%avatar, ?outcome, "child position ignored");
                }
            }
            RegionMessage::CloseChild { avatar, ticket } => {
                self.registry.close_child(avatar, ticket);
            }
            RegionMessage::ObjectCreated { object } => {
                let id = object.id;
                match self.scene.insert_replicated(object) {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(object = %id, "replicated object already known"),
                    Err(e) => {
                        tracing::warn!(object = %id, error = %e, "replicated object refused");
                        return Vec::new();
                    }
                }
                return self
                    .coordinator
                    .on_object_created_by_sync(&mut self.scene, id);
            }
        }
        Vec::new()
    }
}
