use std::collections::BTreeMap;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use regionsync_common::{AvatarId, RegionId, to_local};
use regionsync_kernel::{
    EstablishmentTicket, PresenceRegistry, RegionMessage, Transport, TransportError, Viewer,
};

use crate::neighbors::NeighborMap;

/// Notifier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Distance (metres) from a neighbour's footprint inside which an avatar
    /// is mirrored there.
    pub interest_margin: f64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            interest_margin: 64.0,
        }
    }
}

/// A child presence could not be set up in a neighbour. Retried on the next
/// root move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EstablishmentError {
    #[error("region {region} refused a child presence for {avatar}")]
    Rejected { avatar: AvatarId, region: RegionId },
    #[error("could not reach region {region} for {avatar}: {source}")]
    Unreachable {
        avatar: AvatarId,
        region: RegionId,
        #[source]
        source: TransportError,
    },
}

/// Mirror state of one avatar in one neighbour, as seen from the root region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Establishment sent, no reply yet.
    Pending(EstablishmentTicket),
    Established(EstablishmentTicket),
}

impl NeighborState {
    pub fn ticket(self) -> EstablishmentTicket {
        match self {
            Self::Pending(t) | Self::Established(t) => t,
        }
    }
}

/// What one root move caused.
#[derive(Debug, Default)]
pub struct NeighborDiff {
    pub requested: Vec<RegionId>,
    pub updated: Vec<RegionId>,
    pub closed: Vec<RegionId>,
    pub failures: Vec<EstablishmentError>,
}

impl NeighborDiff {
    pub fn is_empty(&self) -> bool {
        self.requested.is_empty()
            && self.updated.is_empty()
            && self.closed.is_empty()
            && self.failures.is_empty()
    }
}

/// Keeps neighbour regions' child mirrors of locally rooted avatars current.
///
/// Fire-and-forget: every call sends one-way messages and returns without
/// waiting for the neighbours.
#[derive(Debug)]
pub struct NeighborNotifier {
    map: NeighborMap,
    config: NotifierConfig,
    next_seq: u64,
    tracked: BTreeMap<AvatarId, BTreeMap<RegionId, NeighborState>>,
}

impl NeighborNotifier {
    pub fn new(map: NeighborMap, config: NotifierConfig) -> Self {
        Self {
            map,
            config,
            next_seq: 0,
            tracked: BTreeMap::new(),
        }
    }

    pub fn map(&self) -> &NeighborMap {
        &self.map
    }

    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Region owning a world-global position, if it is home or a neighbour.
    pub fn owner_of(&self, global: DVec3) -> Option<RegionId> {
        self.map.owner_of(global)
    }

    pub fn state(&self, avatar: AvatarId, region: RegionId) -> Option<NeighborState> {
        self.tracked.get(&avatar)?.get(&region).copied()
    }

    /// Neighbours tracked for `avatar`, pending or established.
    pub fn tracked(&self, avatar: AvatarId) -> Vec<(RegionId, NeighborState)> {
        self.tracked
            .get(&avatar)
            .map(|m| m.iter().map(|(r, s)| (*r, *s)).collect())
            .unwrap_or_default()
    }

    /// React to a Root move of `avatar` in `registry`'s region.
    ///
    /// Requests mirrors in newly qualifying neighbours, closes mirrors in
    /// neighbours the avatar left, and pushes the translated position to every
    /// established mirror.
    pub fn on_root_moved(
        &mut self,
        registry: &mut PresenceRegistry,
        avatar: AvatarId,
        viewer: &dyn Viewer,
        transport: &dyn Transport,
    ) -> NeighborDiff {
        let mut diff = NeighborDiff::default();
        let Some(root) = registry.get(avatar).filter(|p| p.is_root()) else {
            return diff;
        };
        let _span = tracing::debug_span!("neighbor_update", %avatar).entered();
        let global = root.global_position(registry.region());
        let name = root.name.clone();
        let home = registry.region().id();

        let Self {
            map,
            config,
            next_seq,
            tracked,
        } = self;
        let wanted = map.qualifying(global, config.interest_margin);
        let entry = tracked.entry(avatar).or_default();

        let leaving: Vec<RegionId> = entry
            .keys()
            .filter(|r| !wanted.contains(r))
            .copied()
            .collect();
        for region in leaving {
            let Some(state) = entry.remove(&region) else {
                continue;
            };
            registry.drop_mirror(avatar, region);
            let close = RegionMessage::CloseChild {
                avatar,
                ticket: state.ticket(),
            };
            if let Err(e) = transport.send(region, close) {
                tracing::warn!(%region, error = %e, "close child not delivered");
            }
            diff.closed.push(region);
        }

        for region in wanted {
            let Some(neighbour) = map.get(region) else {
                continue;
            };
            let position = to_local(global, neighbour);
            match entry.get(&region).copied() {
                Some(NeighborState::Pending(_)) => {}
                Some(NeighborState::Established(ticket)) => {
                    let update = RegionMessage::ChildPosition {
                        avatar,
                        position,
                        ticket,
                    };
                    match transport.send(region, update) {
                        Ok(()) => diff.updated.push(region),
                        Err(source) => {
                            entry.remove(&region);
                            registry.drop_mirror(avatar, region);
                            diff.failures
                                .push(unreachable(avatar, region, source));
                        }
                    }
                }
                None => {
                    *next_seq += 1;
                    let ticket = EstablishmentTicket {
                        issuer: home,
                        seq: *next_seq,
                    };
                    let establish = RegionMessage::EstablishChild {
                        avatar,
                        name: name.clone(),
                        root_region: home,
                        position,
                        ticket,
                        client: viewer.circuit(region),
                    };
                    match transport.send(region, establish) {
                        Ok(()) => {
                            entry.insert(region, NeighborState::Pending(ticket));
                            diff.requested.push(region);
                        }
                        Err(source) => diff.failures.push(unreachable(avatar, region, source)),
                    }
                }
            }
        }

        if entry.is_empty() {
            tracked.remove(&avatar);
        }
        for failure in &diff.failures {
            tracing::warn!(error = %failure, "child establishment failed");
        }
        tracing::trace!(
            requested = diff.requested.len(),
            updated = diff.updated.len(),
            closed = diff.closed.len(),
            "neighbor update complete"
        );
        diff
    }

    /// Apply a neighbour's reply to an establishment request.
    ///
    /// Returns `Ok(true)` when the mirror is now established and `Ok(false)`
    /// when the reply no longer matches anything pending (the avatar moved
    /// away or logged out meanwhile). A refusal drops the entry so the next
    /// move retries.
    pub fn on_establish_result(
        &mut self,
        registry: &mut PresenceRegistry,
        avatar: AvatarId,
        region: RegionId,
        ticket: EstablishmentTicket,
        accepted: bool,
    ) -> Result<bool, EstablishmentError> {
        let Some(entry) = self.tracked.get_mut(&avatar) else {
            tracing::debug!(%avatar, %region, "establishment reply for untracked avatar");
            return Ok(false);
        };
        if entry.get(&region) != Some(&NeighborState::Pending(ticket)) {
            tracing::debug!(%avatar, %region, seq = ticket.seq, "stale establishment reply");
            return Ok(false);
        }
        if accepted {
            entry.insert(region, NeighborState::Established(ticket));
            registry.record_mirror(avatar, region);
            return Ok(true);
        }
        entry.remove(&region);
        if entry.is_empty() {
            self.tracked.remove(&avatar);
        }
        let err = EstablishmentError::Rejected { avatar, region };
        tracing::warn!(error = %err, "child establishment failed");
        Err(err)
    }

    /// The avatar's Root is leaving this region: close every mirror,
    /// pending ones included, and forget it.
    pub fn on_root_departed(
        &mut self,
        registry: &mut PresenceRegistry,
        avatar: AvatarId,
        transport: &dyn Transport,
    ) -> Vec<RegionId> {
        let Some(entry) = self.tracked.remove(&avatar) else {
            return Vec::new();
        };
        let mut closed = Vec::with_capacity(entry.len());
        for (region, state) in entry {
            registry.drop_mirror(avatar, region);
            let close = RegionMessage::CloseChild {
                avatar,
                ticket: state.ticket(),
            };
            if let Err(e) = transport.send(region, close) {
                tracing::warn!(%region, error = %e, "close child not delivered");
            }
            closed.push(region);
        }
        closed
    }
}

fn unreachable(avatar: AvatarId, region: RegionId, source: TransportError) -> EstablishmentError {
    EstablishmentError::Unreachable {
        avatar,
        region,
        source,
    }
}
