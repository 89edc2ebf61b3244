use std::collections::BTreeMap;
use std::sync::Arc;

use glam::DVec3;

use regionsync_chat::{ChatMessage, DeliveryReport};
use regionsync_common::{ActorRole, AvatarId, ObjectId, Region, RegionId, to_global, to_local};
use regionsync_kernel::{PresenceRegistry, RootClaims, SceneEvent};
use regionsync_persist::{BackupLedger, PersistenceBinder};
use regionsync_stream::{NeighborDiff, NeighborMap};
use regionsync_sync::{ClusterDirectory, HookError, RegistrationOutcome};

use crate::config::HostConfig;
use crate::host::{HostError, RegionHost, TickReport};
use crate::transport::LocalTransport;

/// Upper bound on mailbox rounds in [`Cluster::pump`].
const MAX_PUMP_ROUNDS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("no region {0} in this cluster")]
    UnknownRegion(RegionId),
    #[error("no region owns {0}")]
    Unowned(DVec3),
    #[error("region {0} already has a second actor")]
    ActorExists(RegionId),
    #[error(transparent)]
    Host(#[from] HostError),
}

/// What a cluster-level move did.
#[derive(Debug)]
pub enum MoveOutcome {
    Moved(NeighborDiff),
    /// The avatar left its region and is now rooted in `to`.
    Crossed { from: RegionId, to: RegionId },
}

/// Everything [`Cluster::pump`] drained.
#[derive(Debug, Default)]
pub struct PumpReport {
    pub handled: usize,
    pub hook_errors: Vec<(RegionId, HookError)>,
    pub scene_events: Vec<(RegionId, SceneEvent)>,
}

impl PumpReport {
    fn absorb(&mut self, region: RegionId, tick: TickReport) {
        self.handled += tick.handled;
        self.hook_errors
            .extend(tick.hook_errors.into_iter().map(|e| (region, e)));
        self.scene_events
            .extend(tick.scene_events.into_iter().map(|e| (region, e)));
    }
}

/// A set of region hosts in one process, sharing a root-claim ledger and an
/// in-process transport.
///
/// Each region has one primary host, which owns presences, and may have one
/// more actor (for example scene persistence) fed by the primary's sync
/// stream over its own mailbox plane.
#[derive(Debug)]
pub struct Cluster {
    claims: RootClaims,
    transport: LocalTransport,
    hosts: BTreeMap<RegionId, RegionHost>,
    actors: BTreeMap<RegionId, RegionHost>,
    ledgers: BTreeMap<RegionId, BackupLedger>,
}

impl Cluster {
    /// Start a host for each region. Regions whose footprints touch become
    /// neighbours. Scene-persistence hosts get a binder backed by their own
    /// in-memory ledger.
    pub fn build(regions: Vec<(Region, HostConfig)>) -> Self {
        let claims = RootClaims::new();
        let transport = LocalTransport::new();
        let all: Vec<Region> = regions.iter().map(|(r, _)| r.clone()).collect();
        let mut hosts = BTreeMap::new();
        let mut ledgers = BTreeMap::new();

        for (region, config) in regions {
            let id = region.id();
            let inbox = transport.open(id);
            let map = NeighborMap::from_regions(region, &all);
            tracing::debug!(region = map.home().name(), neighbours = map.len(), "host");
            let mut host = RegionHost::new(
                map,
                claims.clone(),
                Arc::new(transport.clone()),
                inbox,
                &config,
            );
            if let Some(ledger) = bind_persistence(&mut host, &config) {
                ledgers.insert(id, ledger);
            }
            hosts.insert(id, host);
        }

        Self {
            claims,
            transport,
            hosts,
            actors: BTreeMap::new(),
            ledgers,
        }
    }

    /// Run a second actor for `region`. The primary host replicates its local
    /// creations to it; the actor sees the same region and frame.
    pub fn add_actor(&mut self, region: RegionId, config: &HostConfig) -> Result<(), ClusterError> {
        if self.actors.contains_key(&region) {
            return Err(ClusterError::ActorExists(region));
        }
        let primary = self
            .hosts
            .get_mut(&region)
            .ok_or(ClusterError::UnknownRegion(region))?;
        let plane = LocalTransport::new();
        let inbox = plane.open(region);
        let mut actor = RegionHost::new(
            NeighborMap::new(primary.region().clone()),
            self.claims.clone(),
            Arc::new(plane.clone()),
            inbox,
            config,
        );
        if let Some(ledger) = bind_persistence(&mut actor, config) {
            self.ledgers.insert(region, ledger);
        }
        primary.add_sync_peer(Arc::new(plane));
        tracing::info!(region = primary.region().name(), role = %config.role, "actor added");
        self.actors.insert(region, actor);
        Ok(())
    }

    /// The second actor of `region`, if one was added.
    pub fn actor(&self, region: RegionId) -> Option<&RegionHost> {
        self.actors.get(&region)
    }

    /// A `columns` x `rows` block of default-size regions starting at grid
    /// `origin`, all with the same configuration.
    pub fn grid(columns: u32, rows: u32, origin: (u32, u32), config: &HostConfig) -> Self {
        let mut regions = Vec::new();
        for row in 0..rows {
            for col in 0..columns {
                let (gx, gy) = (origin.0 + col, origin.1 + row);
                let region = Region::new(RegionId::new(), format!("region-{gx}-{gy}"), gx, gy);
                regions.push((region, config.clone()));
            }
        }
        Self::build(regions)
    }

    pub fn claims(&self) -> &RootClaims {
        &self.claims
    }

    pub fn transport(&self) -> &LocalTransport {
        &self.transport
    }

    pub fn host(&self, id: RegionId) -> Option<&RegionHost> {
        self.hosts.get(&id)
    }

    pub fn host_mut(&mut self, id: RegionId) -> Option<&mut RegionHost> {
        self.hosts.get_mut(&id)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &RegionHost> {
        self.hosts.values()
    }

    /// Host whose region has `name`.
    pub fn by_name(&self, name: &str) -> Option<RegionId> {
        self.hosts
            .values()
            .find(|h| h.region().name() == name)
            .map(RegionHost::id)
    }

    /// Backup ledger of a scene-persistence host.
    pub fn ledger(&self, id: RegionId) -> Option<&BackupLedger> {
        self.ledgers.get(&id)
    }

    /// Region owning a world-global position.
    pub fn region_at(&self, global: DVec3) -> Option<RegionId> {
        self.hosts
            .values()
            .find(|h| h.region().contains_global(global))
            .map(RegionHost::id)
    }

    /// Register every host and actor with `directory`.
    pub fn start(&mut self, directory: &dyn ClusterDirectory) -> Vec<(RegionId, RegistrationOutcome)> {
        self.hosts
            .iter_mut()
            .chain(self.actors.iter_mut())
            .map(|(id, host)| (*id, host.start(directory)))
            .collect()
    }

    /// Drain every mailbox until no host has anything left to process.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();
        for _ in 0..MAX_PUMP_ROUNDS {
            let before = report.handled;
            for (id, host) in self.hosts.iter_mut().chain(self.actors.iter_mut()) {
                report.absorb(*id, host.step());
            }
            if report.handled == before {
                return report;
            }
        }
        tracing::warn!(rounds = MAX_PUMP_ROUNDS, "cluster did not settle");
        report
    }

    /// Chat from an avatar rooted in `region`, heard in that region and in
    /// every neighbour hosted here.
    pub fn chat_from_avatar(
        &self,
        region: RegionId,
        avatar: AvatarId,
        message: &ChatMessage,
    ) -> Result<DeliveryReport, ClusterError> {
        let host = self
            .hosts
            .get(&region)
            .ok_or(ClusterError::UnknownRegion(region))?;
        Ok(host.chat_from_avatar(avatar, message, &self.neighbour_registries(host))?)
    }

    /// Chat from an object in `region`, heard in that region and its
    /// neighbours.
    pub fn chat_from_object(
        &self,
        region: RegionId,
        object: ObjectId,
        message: &ChatMessage,
    ) -> Result<DeliveryReport, ClusterError> {
        let host = self
            .hosts
            .get(&region)
            .ok_or(ClusterError::UnknownRegion(region))?;
        Ok(host.chat_from_object(object, message, &self.neighbour_registries(host))?)
    }

    fn neighbour_registries(&self, host: &RegionHost) -> Vec<&PresenceRegistry> {
        host.notifier()
            .map()
            .neighbours()
            .filter_map(|r| self.hosts.get(&r.id()))
            .map(RegionHost::registry)
            .collect()
    }

    /// Move a rooted avatar, handing it to the owning region when the new
    /// position leaves its current one.
    pub fn move_avatar(
        &mut self,
        region: RegionId,
        avatar: AvatarId,
        position: DVec3,
        flying: bool,
    ) -> Result<MoveOutcome, ClusterError> {
        let host = self
            .hosts
            .get_mut(&region)
            .ok_or(ClusterError::UnknownRegion(region))?;
        let global = match host.move_avatar(avatar, position, flying) {
            Ok(diff) => return Ok(MoveOutcome::Moved(diff)),
            Err(HostError::OutsideRegion { .. }) => to_global(position, host.region()),
            Err(e) => return Err(e.into()),
        };
        let target = self
            .region_at(global)
            .ok_or(ClusterError::Unowned(global))?;

        let (presence, viewer) = self
            .hosts
            .get_mut(&region)
            .ok_or(ClusterError::UnknownRegion(region))?
            .hand_off(avatar)?;
        let dest = self
            .hosts
            .get_mut(&target)
            .ok_or(ClusterError::UnknownRegion(target))?;
        let local = to_local(global, dest.region());
        dest.login(avatar, &presence.name, local, flying, viewer)?;
        tracing::info!(%avatar, from = %region, to = %target, "region crossing");
        Ok(MoveOutcome::Crossed {
            from: region,
            to: target,
        })
    }
}

/// Install a persistence binder on scene-persistence hosts.
fn bind_persistence(host: &mut RegionHost, config: &HostConfig) -> Option<BackupLedger> {
    if config.role != ActorRole::ScenePersistence {
        return None;
    }
    let ledger = BackupLedger::new();
    host.add_creation_hook(Box::new(PersistenceBinder::new(ledger.clone())));
    Some(ledger)
}
